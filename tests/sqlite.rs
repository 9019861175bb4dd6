#![cfg(feature = "sqlite")]

mod common;

use krisis::sql::ColumnRef;
use krisis::{AliasMap, CompilerConfig, Dialect, Filter, FilterCompiler, QueryBuilder, apply_sort};
use serde_json::{Value, json};
use sqlx::{Row, SqlitePool};

async fn seeded_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();

    let statements = [
        "CREATE TABLE roles (id INTEGER PRIMARY KEY, name TEXT)",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, email TEXT, password TEXT, role INTEGER)",
        "CREATE TABLE article (id INTEGER PRIMARY KEY, title TEXT, text TEXT, likes INTEGER, big_id INTEGER, date_created TEXT, location TEXT, author INTEGER, header TEXT, collection TEXT)",
        "CREATE TABLE links_list (id INTEGER PRIMARY KEY, name TEXT, url TEXT, article_id INTEGER)",
        "CREATE TABLE image (id INTEGER PRIMARY KEY, title TEXT)",
        "CREATE TABLE video (id INTEGER PRIMARY KEY, title TEXT)",
        "INSERT INTO roles VALUES (1, 'admin'), (2, 'editor')",
        "INSERT INTO users VALUES (1, 'ada', 'ada@example.com', NULL, 1), (2, 'bob', 'bob@example.com', NULL, 2)",
        "INSERT INTO article VALUES \
            (1, 'rust x', '', 2500, 1, '2024-03-01 10:00:00', NULL, 1, '1', 'image'), \
            (2, 'go', 'body', 10, 2, '2023-06-01 10:00:00', NULL, 2, '1', 'video'), \
            (3, 'xylophone', NULL, 3000, 3, '2024-07-01 10:00:00', NULL, 2, '2', 'image')",
        "INSERT INTO links_list VALUES (1, 'docs', 'https://a', 1), (2, 'blog', NULL, 1), (3, 'docs', 'https://b', 3)",
        "INSERT INTO image VALUES (1, 'cover'), (2, 'banner')",
        "INSERT INTO video VALUES (1, 'intro')",
    ];
    for statement in statements {
        if let Err(err) = sqlx::query(statement).execute(&pool).await {
            panic!("Error: {:#?}", err);
        }
    }

    pool
}

async fn article_ids(pool: &SqlitePool, filter: Value, sort: &[&str]) -> Vec<i64> {
    let schema = common::blog_schema();
    let config = CompilerConfig::with_dialect(Dialect::Sqlite);
    let filter = Filter::parse(&filter).unwrap();

    let mut query = QueryBuilder::new("article");
    query.select(ColumnRef::new("article", "id"), None);
    let mut aliases: AliasMap = config.alias_map();

    FilterCompiler::new(&schema)
        .with_config(config.clone())
        .apply(&mut query, &filter, "article", &mut aliases)
        .unwrap();
    apply_sort(&mut query, &schema, sort, "article", &mut aliases).unwrap();

    let statement = config.render(&query);
    let rows = match statement.bind_sqlite().fetch_all(pool).await {
        Ok(rows) => rows,
        Err(err) => panic!("Error: {:#?}\n{}", err, statement.sql),
    };
    rows.iter().map(|row| row.get::<i64, _>(0)).collect()
}

#[tokio::test]
async fn test_sqlite_leaf_filters() {
    let pool = seeded_pool().await;

    let ids = article_ids(
        &pool,
        json!({ "_and": [{ "title": { "_contains": "x" } }, { "likes": { "_gte": 2000 } }] }),
        &["id"],
    )
    .await;
    assert_eq!(ids, vec![1, 3]);

    let ids = article_ids(&pool, json!({ "title": { "_istarts_with": "X" } }), &["id"]).await;
    assert_eq!(ids, vec![3]);

    let ids = article_ids(&pool, json!({ "likes": { "_between": [2000, 2600] } }), &[]).await;
    assert_eq!(ids, vec![1]);

    let ids = article_ids(&pool, json!({ "text": { "_empty": true } }), &["id"]).await;
    assert_eq!(ids, vec![1, 3]);

    let ids = article_ids(&pool, json!({ "year(date_created)": { "_eq": 2024 } }), &["-id"]).await;
    assert_eq!(ids, vec![3, 1]);
}

#[tokio::test]
async fn test_sqlite_relational_filters() {
    let pool = seeded_pool().await;

    let ids = article_ids(
        &pool,
        json!({ "author": { "role": { "name": { "_eq": "editor" } } } }),
        &["id"],
    )
    .await;
    assert_eq!(ids, vec![2, 3]);

    let ids = article_ids(
        &pool,
        json!({ "header:image": { "title": { "_eq": "cover" } } }),
        &[],
    )
    .await;
    assert_eq!(ids, vec![1]);

    // article 2 points at video 1 and must not match image 1
    let ids = article_ids(&pool, json!({ "header:image": { "_eq": "1" } }), &["id"]).await;
    assert_eq!(ids, vec![1]);

    let ids = article_ids(
        &pool,
        json!({ "links": { "_some": { "name": { "_eq": "docs" } } } }),
        &["id"],
    )
    .await;
    assert_eq!(ids, vec![1, 3]);

    let ids = article_ids(
        &pool,
        json!({ "links": { "_none": { "url": { "_null": true } } } }),
        &["id"],
    )
    .await;
    assert_eq!(ids, vec![2, 3]);

    let ids = article_ids(&pool, json!({ "count(links)": { "_gt": 1 } }), &[]).await;
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn test_sqlite_sort_through_join() {
    let pool = seeded_pool().await;

    let ids = article_ids(
        &pool,
        json!({ "author": { "id": { "_nnull": true } } }),
        &["-author.name", "id"],
    )
    .await;
    assert_eq!(ids, vec![2, 3, 1]);
}
