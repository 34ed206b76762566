//! End-to-end tests running the full manager pipeline against SQLite.
//!
//! Each test gets its own named shared in-memory database so factory-minted
//! sessions all see the same seeded data while tests stay isolated.

use query_manager::{
    share, Entity, FieldDef, ModelDef, ModelGraph, ParamStyle, QueryManager, RelationDef, Result,
    Row, SessionBroker, SessionFactory, SortKey, Value,
};
use query_manager_sqlite::SqliteSessionFactory;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct Item {
    id: i64,
    name: String,
    number: Option<i64>,
    group_id: Option<i64>,
}

impl Entity for Item {
    fn model() -> &'static str {
        "item"
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            number: row.get("number")?,
            group_id: row.get("group_id")?,
        })
    }
}

fn graph() -> Arc<ModelGraph> {
    Arc::new(
        ModelGraph::new()
            .register(
                ModelDef::new("item", "items")
                    .field(FieldDef::new("id").primary_key())
                    .field(FieldDef::new("name"))
                    .field(FieldDef::new("number"))
                    .field(FieldDef::new("group_id"))
                    .relation(RelationDef::many_to_one("group", "group", "group_id", "id")),
            )
            .register(
                ModelDef::new("group", "groups")
                    .field(FieldDef::new("id").primary_key())
                    .field(FieldDef::new("name"))
                    .field(FieldDef::new("owner_id"))
                    .relation(RelationDef::many_to_one("owner", "owner", "owner_id", "id")),
            )
            .register(
                ModelDef::new("owner", "owners")
                    .field(FieldDef::new("id").primary_key())
                    .field(FieldDef::new("first_name")),
            ),
    )
}

const SCHEMA: &str = "
    CREATE TABLE owners (id INTEGER PRIMARY KEY, first_name TEXT NOT NULL);
    CREATE TABLE groups (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        owner_id INTEGER REFERENCES owners(id)
    );
    CREATE TABLE items (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        number INTEGER,
        group_id INTEGER REFERENCES groups(id)
    );
    INSERT INTO owners (id, first_name) VALUES (1, 'olivia'), (2, 'oscar');
    INSERT INTO groups (id, name, owner_id) VALUES
        (1, 'red', 1), (2, 'blue', 2), (3, 'green', NULL);
    INSERT INTO items (id, name, number, group_id) VALUES
        (1, 'item01', 1, 1),
        (2, 'item02', 2, 1),
        (3, 'item03', 3, 1),
        (4, 'item04', 4, 1),
        (5, 'item05', 5, 2),
        (6, 'item06', 6, 2),
        (7, 'item07', 7, 2),
        (8, 'item08', 8, 3),
        (9, 'item09', NULL, NULL),
        (10, 'item10', 10, NULL);
";

async fn setup(db_name: &str) -> QueryManager<Item> {
    let factory = Arc::new(SqliteSessionFactory::shared_memory(db_name).unwrap());
    let mut session = factory.create_session().await.unwrap();
    for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
        session.execute(statement, &[]).await.unwrap();
    }
    session.close();

    let broker = SessionBroker::new().with_factory(factory);
    QueryManager::new(graph(), broker, ParamStyle::Sqlite)
}

fn ids(items: &[Item]) -> Vec<i64> {
    items.iter().map(|i| i.id).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_range_filter_with_descending_order() {
    let qm = setup("range_filter").await;
    let items = qm
        .filter("number__gt", 3_i64)
        .filter("number__lt", 10_i64)
        .order_by(["-name"])
        .all()
        .await
        .unwrap();
    assert_eq!(ids(&items), vec![8, 7, 6, 5, 4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_results_stay_readable_after_sessions_close() {
    // every session here is factory-owned and closed when its scope ends;
    // the returned entities are fully materialized copies
    let qm = setup("detached_results").await;
    let items = qm.all().await.unwrap();
    assert_eq!(items.len(), 10);
    assert_eq!(items[0].name, "item01");
    assert_eq!(items[8].number, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_in_matches_nothing() {
    let qm = setup("empty_in").await;
    let items = qm
        .filter("id__in", Value::List(vec![]))
        .all()
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_not_in_keeps_only_non_null() {
    let qm = setup("empty_not_in").await;
    let items = qm
        .filter("number__not_in", Value::List(vec![]))
        .all()
        .await
        .unwrap();
    // item09 has a null number and is excluded
    assert_eq!(items.len(), 9);
    assert!(items.iter().all(|i| i.number.is_some()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_not_in_excludes_nulls_like_sql() {
    let qm = setup("not_in_nulls").await;
    let items = qm
        .filter(
            "number__not_in",
            Value::List(vec![Value::Int(1), Value::Int(2)]),
        )
        .all()
        .await
        .unwrap();
    assert_eq!(ids(&items), vec![3, 4, 5, 6, 7, 8, 10]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_isnull_lookup() {
    let qm = setup("isnull").await;
    let missing = qm.clone().filter("number__isnull", true).all().await.unwrap();
    assert_eq!(ids(&missing), vec![9]);
    let present = qm.filter("number__isnull", false).count().await.unwrap();
    assert_eq!(present, 9);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_null_equality_is_null_test() {
    let qm = setup("null_eq").await;
    let items = qm.filter("number", Value::Null).all().await.unwrap();
    assert_eq!(ids(&items), vec![9]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ilike_is_case_insensitive() {
    let qm = setup("ilike").await;
    let count = qm.filter("name__ilike", "ITEM0%").count().await.unwrap();
    assert_eq!(count, 9);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cross_model_filter_and_order_share_one_join() {
    let qm = setup("join_dedup").await;
    let items = qm
        .filter("group__name", "red")
        .order_by(["group__name", "id"])
        .all()
        .await
        .unwrap();
    assert_eq!(ids(&items), vec![1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_explicit_join_and_filter_on_same_path() {
    let qm = setup("join_directive").await;
    let items = qm
        .inner_join("group")
        .filter("group__name", "red")
        .all()
        .await
        .unwrap();
    assert_eq!(items.len(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_two_hop_path() {
    let qm = setup("two_hop").await;
    let items = qm
        .filter("group__owner__first_name", "oscar")
        .order_by(["id"])
        .all()
        .await
        .unwrap();
    assert_eq!(ids(&items), vec![5, 6, 7]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_left_join_directive_keeps_unmatched_rows() {
    let qm = setup("left_join").await;
    // the projection alone would imply an inner join; the directive
    // declared first makes it a left join
    let rows = qm
        .left_join("group")
        .only(["id", "group__name"])
        .order_by(["id"])
        .all()
        .await
        .unwrap();
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0].get::<Option<String>>("group__name").unwrap().as_deref(), Some("red"));
    assert_eq!(rows[9].get::<Option<String>>("group__name").unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_projection_implies_inner_join() {
    let qm = setup("projection_join").await;
    let rows = qm.only(["id", "group__name"]).all().await.unwrap();
    // items 9 and 10 have no group and drop out
    assert_eq!(rows.len(), 8);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_projected_first_returns_single_column_row() {
    let qm = setup("projected_first").await;
    let row = qm.only(["id"]).first().await.unwrap().unwrap();
    assert_eq!(row.columns(), &["id".to_string()]);
    assert_eq!(row.get::<i64>("id").unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_whole_model_projection() {
    let qm = setup("whole_model").await;
    let rows = qm
        .only(["group"])
        .filter("id", 1_i64)
        .all()
        .await
        .unwrap();
    assert_eq!(rows[0].get::<String>("group__name").unwrap(), "red");
    assert_eq!(rows[0].get::<i64>("group__id").unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_limit_and_offset_page() {
    let qm = setup("pagination").await;
    let items = qm
        .order_by(["id"])
        .limit(5)
        .offset(5)
        .all()
        .await
        .unwrap();
    assert_eq!(ids(&items), vec![6, 7, 8, 9, 10]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_offset_without_limit() {
    let qm = setup("offset_only").await;
    let items = qm.order_by(["id"]).offset(5).all().await.unwrap();
    assert_eq!(ids(&items), vec![6, 7, 8, 9, 10]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_order_with_null_placement() {
    let qm = setup("null_placement").await;
    let items = qm
        .clone()
        .order_by_key(SortKey::asc("number").nulls_last())
        .all()
        .await
        .unwrap();
    // item09's null number sorts after every value
    assert_eq!(ids(&items), vec![1, 2, 3, 4, 5, 6, 7, 8, 10, 9]);

    let reversed = qm
        .order_by_key(SortKey::desc("number").nulls_first())
        .all()
        .await
        .unwrap();
    assert_eq!(reversed[0].id, 9);
    assert_eq!(reversed[1].id, 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_join_keeps_unmatched_rows_on_both_sides() {
    let factory = Arc::new(SqliteSessionFactory::shared_memory("full_join").unwrap());
    let mut seed = factory.create_session().await.unwrap();
    for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
        seed.execute(statement, &[]).await.unwrap();
    }
    // a group no item points at, so both sides have unmatched rows
    seed.execute(
        "INSERT INTO groups (id, name, owner_id) VALUES (4, 'empty', NULL)",
        &[],
    )
    .await
    .unwrap();
    seed.close();

    let broker = SessionBroker::new().with_factory(factory);
    let qm: QueryManager<Item> = QueryManager::new(graph(), broker, ParamStyle::Sqlite);

    let rows = qm
        .full_join("group")
        .only(["id", "group__name"])
        .order_by(["id"])
        .all()
        .await
        .unwrap();
    // 10 items plus the itemless group
    assert_eq!(rows.len(), 11);
    // SQLite sorts nulls first ascending: the itemless group leads
    assert_eq!(rows[0].get::<Option<i64>>("id").unwrap(), None);
    assert_eq!(
        rows[0].get::<Option<String>>("group__name").unwrap().as_deref(),
        Some("empty")
    );
    assert_eq!(rows[10].get::<Option<String>>("group__name").unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_first_respects_staged_order() {
    let qm = setup("first_order").await;
    let item = qm
        .filter("number__lte", 3_i64)
        .order_by(["name"])
        .first()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.id, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_last_is_newest_by_pk_not_staged_order() {
    let qm = setup("last_override").await;
    // descending name order would end on item01; last() ignores it and
    // takes the highest primary key instead
    let item = qm
        .filter("number__lte", 3_i64)
        .order_by(["-name"])
        .last()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.id, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_by_filters() {
    let qm = setup("get").await;
    let item = qm.get([("id", 3_i64)]).await.unwrap().unwrap();
    assert_eq!(item.name, "item03");
    let missing = qm.get([("id", 99_i64)]).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_count() {
    let qm = setup("count").await;
    assert_eq!(qm.clone().count().await.unwrap(), 10);
    assert_eq!(
        qm.filter("group__name", "blue").count().await.unwrap(),
        3
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_returns_stored_entity() {
    let qm = setup("create").await;
    let item = qm
        .create([
            ("name", Value::from("item11")),
            ("number", Value::Int(11)),
            ("group_id", Value::Int(2)),
        ])
        .await
        .unwrap();
    assert_eq!(item.id, 11);
    assert_eq!(item.name, "item11");
    assert_eq!(qm.count().await.unwrap(), 11);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_filtered_rows_in_pk_order() {
    let qm = setup("update").await;
    let updated = qm
        .clone()
        .filter("number__gt", 7_i64)
        .update([("name", "renumbered")])
        .await
        .unwrap();
    // items 8 and 10 match; item09's null number does not
    assert_eq!(ids(&updated), vec![8, 10]);
    assert!(updated.iter().all(|i| i.name == "renumbered"));

    let untouched = qm.get([("id", 9_i64)]).await.unwrap().unwrap();
    assert_eq!(untouched.name, "item09");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_through_join_filter() {
    let qm = setup("update_join").await;
    let updated = qm
        .filter("group__owner__first_name", "olivia")
        .update([("number", Value::Int(0))])
        .await
        .unwrap();
    assert_eq!(ids(&updated), vec![1, 2, 3, 4]);
    assert!(updated.iter().all(|i| i.number == Some(0)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_with_no_matches_touches_nothing() {
    let qm = setup("update_noop").await;
    let updated = qm
        .clone()
        .filter("number__gt", 100_i64)
        .update([("name", "x")])
        .await
        .unwrap();
    assert!(updated.is_empty());
    assert_eq!(qm.filter("name", "x").count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_supplied_session_is_reused_and_left_open() {
    let factory = Arc::new(SqliteSessionFactory::shared_memory("supplied_session").unwrap());
    let mut seed = factory.create_session().await.unwrap();
    for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
        seed.execute(statement, &[]).await.unwrap();
    }
    seed.close();

    let broker = SessionBroker::new().with_factory(Arc::clone(&factory) as Arc<dyn SessionFactory>);
    let qm: QueryManager<Item> = QueryManager::new(graph(), broker, ParamStyle::Sqlite);

    let session = share(factory.create_session().await.unwrap());
    let first = qm.all_within(&session).await.unwrap();
    let second = qm.all_within(&session).await.unwrap();
    assert_eq!(first.len(), second.len());

    // the borrowed session is still open and usable directly
    let mut guard = session.lock().await;
    let rows = guard.query("SELECT COUNT(*) AS c FROM items", &[]).await.unwrap();
    assert_eq!(rows[0].get::<i64>("c").unwrap(), 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_within_supplied_session() {
    let factory = Arc::new(SqliteSessionFactory::shared_memory("create_within").unwrap());
    let mut seed = factory.create_session().await.unwrap();
    for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
        seed.execute(statement, &[]).await.unwrap();
    }
    seed.close();

    let broker = SessionBroker::new();
    let qm: QueryManager<Item> = QueryManager::new(graph(), broker, ParamStyle::Sqlite);

    // the broker itself has no resources; the supplied session carries all
    let session = share(factory.create_session().await.unwrap());
    let item = qm
        .create_within([("name", Value::from("item11"))], &session)
        .await
        .unwrap();
    assert_eq!(item.id, 11);
    let count = qm.count_within(&session).await.unwrap();
    assert_eq!(count, 11);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_broker_without_resources_fails() {
    let qm: QueryManager<Item> =
        QueryManager::new(graph(), SessionBroker::new(), ParamStyle::Sqlite);
    assert!(qm.all().await.is_err());
}

#[test]
fn test_blocking_adapter_end_to_end() {
    use query_manager::BlockingQueryManager;

    // seed through a blocking-side runtime of its own
    let factory = Arc::new(SqliteSessionFactory::shared_memory("blocking").unwrap());
    let seed_rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    seed_rt.block_on(async {
        let mut session = factory.create_session().await.unwrap();
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            session.execute(statement, &[]).await.unwrap();
        }
        session.close();
    });

    let broker = SessionBroker::new().with_factory(factory);
    let qm: BlockingQueryManager<Item> =
        BlockingQueryManager::new(graph(), broker, ParamStyle::Sqlite).unwrap();

    let items = qm
        .clone()
        .filter("number__gt", 3_i64)
        .filter("number__lt", 10_i64)
        .order_by(["-name"])
        .all()
        .unwrap();
    assert_eq!(ids(&items), vec![8, 7, 6, 5, 4]);

    let created = qm.clone().create([("name", "item11")]).unwrap();
    assert_eq!(created.id, 11);

    let row = qm.only(["id"]).first().unwrap().unwrap();
    assert_eq!(row.get::<i64>("id").unwrap(), 1);
}
