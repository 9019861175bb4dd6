#![allow(dead_code)]

use krisis::{
    AliasMap, Dialect, Filter, FilterOutcome, QueryBuilder, SchemaBuilder, SchemaOverview,
    Statement,
};
use serde_json::Value;

/// Blog schema shared by the integration tests.
pub fn blog_schema() -> SchemaOverview {
    SchemaBuilder::new()
        .collection("article", |c| {
            c.field("id").id();
            c.field("title").string();
            c.field("text").text();
            c.field("likes").integer();
            c.field("big_id").big_integer();
            c.field("date_created").date_time();
            c.field("location").geometry();
            c.field("author").m2o("users");
            c.field("links").o2m("links_list", "article_id");
            c.field("header").a2o(&["image", "video"]);
            c.field("tags").m2m("tags");
            c.field("blocks").m2a(&["paragraph", "image"]);
        })
        .collection("users", |c| {
            c.field("id").id();
            c.field("name").string();
            c.field("email").string();
            c.field("password").hash();
            c.field("role").m2o("roles");
        })
        .collection("roles", |c| {
            c.field("id").id();
            c.field("name").string();
        })
        .collection("links_list", |c| {
            c.field("id").id();
            c.field("name").string();
            c.field("url").string();
        })
        .collection("image", |c| {
            c.field("id").id();
            c.field("title").string();
        })
        .collection("video", |c| {
            c.field("id").id();
            c.field("title").string();
        })
        .collection("tags", |c| {
            c.field("id").id();
            c.field("name").string();
        })
        .build()
}

#[derive(Debug)]
pub struct Compiled {
    pub query: QueryBuilder,
    pub aliases: AliasMap,
    pub outcome: FilterOutcome,
}

impl Compiled {
    pub fn statement(&self) -> Statement {
        self.query.to_statement(Dialect::Postgres)
    }

    pub fn predicate(&self) -> Statement {
        self.query.where_statement(Dialect::Postgres)
    }

    pub fn alias(&self, path: &str) -> String {
        match self.aliases.get(path) {
            Some(entry) => entry.alias.clone(),
            None => panic!("no join registered for {:?}", path),
        }
    }
}

pub fn compile(collection: &str, filter: Value) -> krisis::Result<Compiled> {
    compile_with(collection, filter, &[])
}

pub fn compile_with(
    collection: &str,
    filter: Value,
    permissions: &[krisis::Permission],
) -> krisis::Result<Compiled> {
    let schema = blog_schema();
    let filter = Filter::parse(&filter)?;
    let mut query = QueryBuilder::new(collection);
    let mut aliases = AliasMap::new();
    let outcome = krisis::apply_filter(
        &mut query,
        &schema,
        &filter,
        collection,
        &mut aliases,
        &[],
        permissions,
    )?;
    Ok(Compiled {
        query,
        aliases,
        outcome,
    })
}
