use std::collections::BTreeMap;

use super::{
    CollectionOverview, FieldOverview, FieldType, Relation, RelationMeta, RelationSchema,
    SchemaOverview,
};

/// Fluent construction of schema snapshots for fixtures and tests.
///
/// ```rust,ignore
/// let schema = SchemaBuilder::new()
///     .collection("article", |c| {
///         c.field("id").id();
///         c.field("author").m2o("users");
///         c.field("links").o2m("links", "article_id");
///     })
///     .build();
/// ```
///
/// Collections referenced by a relation but never declared are created with
/// an integer `id` primary key, and missing foreign-key fields on the many
/// side are added as integers.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    collections: Vec<CollectionBuilder>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(mut self, name: &str, define: impl FnOnce(&mut CollectionBuilder)) -> Self {
        let mut collection = CollectionBuilder::new(name);
        define(&mut collection);
        self.collections.push(collection);
        self
    }

    pub fn build(self) -> SchemaOverview {
        let mut collections: BTreeMap<String, CollectionOverview> = BTreeMap::new();
        let mut relations = Vec::new();
        let mut implied: Vec<(String, String)> = Vec::new();

        for builder in self.collections {
            let primary = builder
                .primary
                .clone()
                .or_else(|| {
                    builder
                        .fields
                        .iter()
                        .find(|f| f.field == "id")
                        .map(|f| f.field.clone())
                })
                .unwrap_or_else(|| "id".to_string());
            let fields = builder
                .fields
                .into_iter()
                .map(|f| (f.field.clone(), f))
                .collect();
            implied.extend(builder.implied_fields);
            relations.extend(builder.relations);
            collections.insert(
                builder.name.clone(),
                CollectionOverview {
                    collection: builder.name,
                    primary,
                    fields,
                },
            );
        }

        for relation in &relations {
            let mut referenced = vec![relation.collection.clone()];
            referenced.extend(relation.related_collection.clone());
            referenced.extend(
                relation
                    .one_allowed_collections()
                    .unwrap_or_default()
                    .iter()
                    .cloned(),
            );
            for name in referenced {
                collections
                    .entry(name.clone())
                    .or_insert_with(|| implicit_collection(&name));
            }
        }

        for (collection, field) in implied {
            if let Some(overview) = collections.get_mut(&collection) {
                overview
                    .fields
                    .entry(field.clone())
                    .or_insert_with(|| FieldOverview {
                        field,
                        field_type: FieldType::Integer,
                        special: Vec::new(),
                        nullable: true,
                    });
            }
        }

        SchemaOverview {
            collections,
            relations,
        }
    }
}

fn implicit_collection(name: &str) -> CollectionOverview {
    let mut fields = BTreeMap::new();
    fields.insert(
        "id".to_string(),
        FieldOverview {
            field: "id".to_string(),
            field_type: FieldType::Integer,
            special: Vec::new(),
            nullable: false,
        },
    );
    CollectionOverview {
        collection: name.to_string(),
        primary: "id".to_string(),
        fields,
    }
}

#[derive(Debug)]
pub struct CollectionBuilder {
    name: String,
    primary: Option<String>,
    fields: Vec<FieldOverview>,
    relations: Vec<Relation>,
    // (collection, field) pairs a relation needs on another collection
    implied_fields: Vec<(String, String)>,
}

impl CollectionBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            primary: None,
            fields: Vec::new(),
            relations: Vec::new(),
            implied_fields: Vec::new(),
        }
    }

    pub fn field(&mut self, name: &str) -> FieldBuilder<'_> {
        self.fields.push(FieldOverview {
            field: name.to_string(),
            field_type: FieldType::Unknown,
            special: Vec::new(),
            nullable: true,
        });
        let index = self.fields.len() - 1;
        FieldBuilder {
            collection: self,
            index,
        }
    }
}

pub struct FieldBuilder<'a> {
    collection: &'a mut CollectionBuilder,
    index: usize,
}

impl FieldBuilder<'_> {
    fn name(&self) -> String {
        self.collection.fields[self.index].field.clone()
    }

    fn typed(self, field_type: FieldType) -> Self {
        self.collection.fields[self.index].field_type = field_type;
        self
    }

    fn special(self, special: &str) -> Self {
        self.collection.fields[self.index]
            .special
            .push(special.to_string());
        self
    }

    /// Integer primary key.
    pub fn id(self) -> Self {
        self.typed(FieldType::Integer).primary()
    }

    pub fn primary(self) -> Self {
        self.collection.primary = Some(self.name());
        self.collection.fields[self.index].nullable = false;
        self
    }

    pub fn uuid(self) -> Self {
        self.typed(FieldType::Uuid)
    }

    pub fn string(self) -> Self {
        self.typed(FieldType::String)
    }

    pub fn text(self) -> Self {
        self.typed(FieldType::Text)
    }

    pub fn integer(self) -> Self {
        self.typed(FieldType::Integer)
    }

    pub fn big_integer(self) -> Self {
        self.typed(FieldType::BigInteger)
    }

    pub fn float(self) -> Self {
        self.typed(FieldType::Float)
    }

    pub fn decimal(self) -> Self {
        self.typed(FieldType::Decimal)
    }

    pub fn boolean(self) -> Self {
        self.typed(FieldType::Boolean)
    }

    pub fn date(self) -> Self {
        self.typed(FieldType::Date)
    }

    pub fn date_time(self) -> Self {
        self.typed(FieldType::DateTime)
    }

    pub fn time(self) -> Self {
        self.typed(FieldType::Time)
    }

    pub fn timestamp(self) -> Self {
        self.typed(FieldType::Timestamp)
    }

    pub fn json(self) -> Self {
        self.typed(FieldType::Json)
    }

    pub fn csv(self) -> Self {
        self.typed(FieldType::Csv)
    }

    pub fn geometry(self) -> Self {
        self.typed(FieldType::Geometry)
    }

    pub fn hash(self) -> Self {
        self.typed(FieldType::Hash).special("conceal")
    }

    /// Foreign key on this collection pointing at `related`.
    pub fn m2o(self, related: &str) -> Self {
        let field = self.name();
        let collection = self.collection.name.clone();
        self.collection
            .relations
            .push(m2o_relation(&collection, &field, related, None, None));
        self.typed(FieldType::Integer).special("m2o")
    }

    /// Reverse side of `related.related_field -> this collection`.
    pub fn o2m(self, related: &str, related_field: &str) -> Self {
        let field = self.name();
        let collection = self.collection.name.clone();
        self.collection.relations.push(m2o_relation(
            related,
            related_field,
            &collection,
            Some(&field),
            None,
        ));
        self.collection
            .implied_fields
            .push((related.to_string(), related_field.to_string()));
        self.typed(FieldType::Alias).special("o2m")
    }

    /// Polymorphic foreign key; the target collection name is stored in a
    /// sibling `collection` field.
    pub fn a2o(self, allowed: &[&str]) -> Self {
        let field = self.name();
        let collection = self.collection.name.clone();
        self.collection
            .relations
            .push(a2o_relation(&collection, &field, allowed, "collection", None));
        self.collection.fields.push(FieldOverview {
            field: "collection".to_string(),
            field_type: FieldType::String,
            special: Vec::new(),
            nullable: true,
        });
        self.typed(FieldType::String).special("a2o")
    }

    /// Many-to-many through a junction named `<collection>_<related>`.
    pub fn m2m(self, related: &str) -> Self {
        let field = self.name();
        let collection = self.collection.name.clone();
        let junction = format!("{collection}_{related}");
        let local_key = format!("{collection}_id");
        let related_key = format!("{related}_id");

        self.collection.relations.push(m2o_relation(
            &junction,
            &local_key,
            &collection,
            Some(&field),
            Some(&related_key),
        ));
        self.collection.relations.push(m2o_relation(
            &junction,
            &related_key,
            related,
            None,
            Some(&local_key),
        ));
        self.collection
            .implied_fields
            .push((junction.clone(), local_key));
        self.collection.implied_fields.push((junction, related_key));
        self.typed(FieldType::Alias).special("m2m")
    }

    /// Many-to-any through a junction named `<collection>_<field>` holding an
    /// `item` polymorphic key.
    pub fn m2a(self, allowed: &[&str]) -> Self {
        let field = self.name();
        let collection = self.collection.name.clone();
        let junction = format!("{collection}_{field}");
        let local_key = format!("{collection}_id");

        self.collection.relations.push(m2o_relation(
            &junction,
            &local_key,
            &collection,
            Some(&field),
            Some("item"),
        ));
        self.collection.relations.push(a2o_relation(
            &junction,
            "item",
            allowed,
            "collection",
            Some(&local_key),
        ));
        self.collection
            .implied_fields
            .push((junction.clone(), local_key));
        self.collection
            .implied_fields
            .push((junction.clone(), "item".to_string()));
        self.collection
            .implied_fields
            .push((junction, "collection".to_string()));
        self.typed(FieldType::Alias).special("m2a")
    }
}

fn m2o_relation(
    collection: &str,
    field: &str,
    related: &str,
    one_field: Option<&str>,
    junction_field: Option<&str>,
) -> Relation {
    Relation {
        collection: collection.to_string(),
        field: field.to_string(),
        related_collection: Some(related.to_string()),
        schema: Some(RelationSchema {
            table: collection.to_string(),
            column: field.to_string(),
            foreign_key_table: Some(related.to_string()),
            foreign_key_column: Some("id".to_string()),
            constraint_name: None,
        }),
        meta: Some(RelationMeta {
            many_collection: collection.to_string(),
            many_field: field.to_string(),
            one_collection: Some(related.to_string()),
            one_field: one_field.map(str::to_string),
            junction_field: junction_field.map(str::to_string),
            ..Default::default()
        }),
    }
}

fn a2o_relation(
    collection: &str,
    field: &str,
    allowed: &[&str],
    collection_field: &str,
    junction_field: Option<&str>,
) -> Relation {
    Relation {
        collection: collection.to_string(),
        field: field.to_string(),
        related_collection: None,
        schema: None,
        meta: Some(RelationMeta {
            many_collection: collection.to_string(),
            many_field: field.to_string(),
            one_allowed_collections: Some(allowed.iter().map(|c| c.to_string()).collect()),
            one_collection_field: Some(collection_field.to_string()),
            junction_field: junction_field.map(str::to_string),
            ..Default::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_implies_related_collections() {
        let schema = SchemaBuilder::new()
            .collection("article", |c| {
                c.field("id").id();
                c.field("author").m2o("users");
                c.field("links").o2m("links_list", "article_id");
            })
            .build();

        assert_eq!(schema.primary_key("users").unwrap(), "id");
        assert!(schema.field("links_list", "article_id").is_some());
        assert_eq!(schema.relations.len(), 2);
        assert_eq!(
            schema.field("article", "links").unwrap().field_type,
            FieldType::Alias
        );
    }

    #[test]
    fn test_builder_m2m_junction() {
        let schema = SchemaBuilder::new()
            .collection("article", |c| {
                c.field("id").id();
                c.field("tags").m2m("tags");
            })
            .build();

        let junction = schema.collection("article_tags").unwrap();
        assert!(junction.fields.contains_key("article_id"));
        assert!(junction.fields.contains_key("tags_id"));
        assert!(schema.collection("tags").is_ok());
    }

    #[test]
    fn test_uuid_primary() {
        let schema = SchemaBuilder::new()
            .collection("test", |c| {
                c.field("key").uuid().primary();
                c.field("name").string();
            })
            .build();

        assert_eq!(schema.primary_key("test").unwrap(), "key");
    }
}
