//! Integration tests for the rowbind-mysql crate, run against the in-memory
//! engine.

use chrono::NaiveDate;
use rowbind_core::{FieldDescriptor, FieldFormat, IndexDescriptor, Row, TableDescriptor, Value};
use rowbind_dict::{ConnectionConfig, Dictionary};
use rowbind_mysql::classify::{CR_SERVER_LOST, ER_BAD_FIELD_ERROR};
use rowbind_mysql::{
    BindMode, Connection, MemoryClient, PersistError, SchemaChange, SchemaSync, Statement, StoreOutcome, Table,
};

/// Events keyed by id, with a title index.
fn events() -> TableDescriptor {
    TableDescriptor::new("events")
        .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 10).primary_key())
        .with_field(FieldDescriptor::new("title", FieldFormat::Ascii, 100).with_description("Title"))
        .with_field(FieldDescriptor::new("genre", FieldFormat::Ascii, 20))
        .with_field(FieldDescriptor::new("inssp", FieldFormat::DateTime, 0))
        .with_field(FieldDescriptor::new("updsp", FieldFormat::DateTime, 0))
        .with_index(IndexDescriptor::new("title", ["title"]))
}

fn setup() -> (Connection, MemoryClient) {
    let client = MemoryClient::new();
    let conn = Connection::new(ConnectionConfig::new("epg"), client.clone());
    (conn, client)
}

fn store_event(table: &mut Table<'_>, id: u32, title: &str, genre: &str) -> StoreOutcome {
    table.set_value("id", id).unwrap();
    table.set_value("title", title).unwrap();
    table.set_value("genre", genre).unwrap();
    table.store().unwrap()
}

// ============================================================================
// Schema synchronization
// ============================================================================

#[test]
fn test_create_table_statement() {
    let def = TableDescriptor::new("t")
        .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 0).primary_key().autoincrement())
        .with_field(FieldDescriptor::new("name", FieldFormat::Ascii, 50).with_description("Name"))
        .with_field(FieldDescriptor::new("updsp", FieldFormat::DateTime, 0));
    let (conn, client) = setup();
    let mut table = Table::new(&conn, &def);

    let report = table.open(true).unwrap();
    assert_eq!(report.applied.len(), 1);
    let ddl = client.ddl_log();
    assert_eq!(
        ddl,
        vec![
            "create table t(id int unsigned not null auto_increment, name varchar(50) comment 'Name', \
             updsp datetime, PRIMARY KEY(id DESC)) ENGINE InnoDB;"
        ]
    );
    // the auto-increment key is already primary, no secondary key
    assert!(!ddl[0].contains(", KEY("));

    table.set_value("name", "first").unwrap();
    assert_eq!(table.store().unwrap(), StoreOutcome::Inserted);
    assert_eq!(table.get_value("id"), Some(Value::UInt(1)));
}

#[test]
fn test_second_sync_emits_nothing() {
    let def = events();
    let (conn, client) = setup();
    {
        let mut table = Table::new(&conn, &def);
        let report = table.open(true).unwrap();
        assert_eq!(report.applied.len(), 2);
        assert_eq!(report.applied[1].change, SchemaChange::CreateIndex("idxtitle".to_string()));
    }

    let mut table = Table::new(&conn, &def);
    let report = table.open(true).unwrap();
    assert!(report.is_empty());
    assert_eq!(client.ddl_log().len(), 2);
}

#[test]
fn test_added_field_is_placed_after_predecessor() {
    let v1 = TableDescriptor::new("events")
        .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 10).primary_key())
        .with_field(FieldDescriptor::new("title", FieldFormat::Ascii, 100));
    let v2 = TableDescriptor::new("events")
        .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 10).primary_key())
        .with_field(FieldDescriptor::new("genre", FieldFormat::Ascii, 20))
        .with_field(FieldDescriptor::new("title", FieldFormat::Ascii, 100));
    let (conn, client) = setup();

    Table::new(&conn, &v1).open(true).unwrap();
    let report = Table::new(&conn, &v2).open(true).unwrap();

    let sql: Vec<&str> = report.sql().collect();
    assert_eq!(sql, vec!["alter table events add column genre varchar(20) after id"]);
    assert_eq!(client.column_names("events").unwrap(), vec!["id", "genre", "title"]);
}

#[test]
fn test_missing_column_without_alter_fails_prepare() {
    let v1 = TableDescriptor::new("events")
        .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 10).primary_key());
    let v2 = v1.clone().with_field(FieldDescriptor::new("title", FieldFormat::Ascii, 100));
    let (conn, _) = setup();

    Table::new(&conn, &v1).open(true).unwrap();
    let err = Table::new(&conn, &v2).open(false).unwrap_err();
    assert_eq!(err.client_error().map(|e| e.code), Some(ER_BAD_FIELD_ERROR));
    assert!(!conn.is_dropped());
}

#[test]
fn test_changed_type_is_modified() {
    let v1 = TableDescriptor::new("events")
        .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 10).primary_key())
        .with_field(FieldDescriptor::new("title", FieldFormat::Ascii, 100));
    let v2 = TableDescriptor::new("events")
        .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 10).primary_key())
        .with_field(FieldDescriptor::new("title", FieldFormat::Text, 0).with_description("Title"));
    let (conn, _) = setup();

    Table::new(&conn, &v1).open(true).unwrap();
    let report = Table::new(&conn, &v2).open(true).unwrap();
    assert_eq!(
        report.sql().collect::<Vec<_>>(),
        vec!["alter table events modify column title text comment 'Title'"]
    );
}

#[test]
fn test_index_with_fewer_columns_is_planned() {
    let v1 = events();
    let mut v2 = events();
    v2.indices = vec![IndexDescriptor::new("title", ["title", "genre"])];
    let (conn, _) = setup();

    Table::new(&conn, &v1).open(true).unwrap();
    conn.connect().unwrap();
    let planned = SchemaSync::new(&conn, &v2).plan(true).unwrap();

    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0].sql, "create index idxtitle on events(title, genre);");
}

#[test]
fn test_rejected_index_does_not_block_open() {
    let def = TableDescriptor::new("t")
        .with_field(FieldDescriptor::new("a", FieldFormat::UInt, 0).primary_key())
        .with_field(FieldDescriptor::new("b", FieldFormat::UInt, 0))
        .with_index(IndexDescriptor::new("ab", ["a", "b"]));
    let (conn, client) = setup();
    conn.connect().unwrap();
    conn.query("setup", "create table t(a int unsigned, b int unsigned, PRIMARY KEY(a DESC)) ENGINE InnoDB;")
        .unwrap();
    conn.query("setup", "create index idxab on t(a);").unwrap();
    client.clear_ddl_log();

    for _ in 0..2 {
        let mut table = Table::new(&conn, &def);
        let report = table.open(false).unwrap();
        assert!(report.applied.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].change, SchemaChange::CreateIndex("idxab".to_string()));
        assert!(table.is_open());

        table.set_value("a", 1u32).unwrap();
        table.set_value("b", 2u32).unwrap();
        table.store().unwrap();
    }
    assert!(client.ddl_log().is_empty());
    assert!(!conn.is_dropped());
}

#[test]
fn test_lost_connection_during_index_creation_aborts() {
    let v1 = events();
    let mut v2 = events();
    v2.indices = vec![IndexDescriptor::new("title", ["title", "genre"])];
    let (conn, client) = setup();
    Table::new(&conn, &v1).open(true).unwrap();

    client.fail_statement("create index", CR_SERVER_LOST, "Lost connection to MySQL server during query");
    let err = Table::new(&conn, &v2).open(true).unwrap_err();
    assert!(err.is_connection_lost());
    assert!(conn.is_dropped());
}

// ============================================================================
// Table operations
// ============================================================================

#[test]
fn test_storage_name_differs_from_logical_name() {
    let def = TableDescriptor::new("events")
        .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 10).primary_key().with_db_name("event_id"))
        .with_field(FieldDescriptor::new("title", FieldFormat::Ascii, 50).with_db_name("event_title"))
        .with_field(FieldDescriptor::new("seq", FieldFormat::UBigInt, 0).autoincrement().with_db_name("event_seq"));
    let (conn, client) = setup();
    let mut table = Table::new(&conn, &def);
    table.open(true).unwrap();
    assert_eq!(client.column_names("events").unwrap(), vec!["event_id", "event_title", "event_seq"]);

    table.set_value("id", 1u32).unwrap();
    table.set_value("title", "Tagesschau").unwrap();
    assert_eq!(table.store().unwrap(), StoreOutcome::Inserted);
    assert_eq!(table.get_value("event_seq"), Some(Value::UBigInt(1)));

    table.set_value("event_title", "Tagesthemen").unwrap();
    assert_eq!(table.store().unwrap(), StoreOutcome::Updated);

    table.clear_values();
    table.set_value("id", 1u32).unwrap();
    assert!(table.find().unwrap());
    assert_eq!(table.get_value("title"), Some(Value::Text("Tagesthemen".to_string())));
    assert_eq!(table.count_where(Some("event_title = 'Tagesthemen'"), None).unwrap(), 1);
}

#[test]
fn test_every_format_through_statements() {
    let stamp = NaiveDate::from_ymd_opt(2024, 3, 9)
        .and_then(|date| date.and_hms_opt(20, 15, 0))
        .unwrap();
    let samples = [
        (FieldFormat::Ascii, Value::Text("hällo".into())),
        (FieldFormat::Text, Value::Text("text".into())),
        (FieldFormat::MText, Value::Text("mtext".into())),
        (FieldFormat::MLob, Value::Blob(vec![0, 159, 255])),
        (FieldFormat::Int, Value::Int(-7)),
        (FieldFormat::UInt, Value::UInt(7)),
        (FieldFormat::BigInt, Value::BigInt(i64::MIN)),
        (FieldFormat::UBigInt, Value::UBigInt(u64::MAX)),
        (FieldFormat::Float, Value::Float(1.25)),
        (FieldFormat::DateTime, Value::DateTime(stamp)),
    ];
    let mut def = TableDescriptor::new("formats")
        .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 0).primary_key());
    for (format, _) in &samples {
        let size = if *format == FieldFormat::Ascii { 50 } else { 0 };
        def.push_field(FieldDescriptor::new(format!("c{}", format.to_string().to_lowercase()), *format, size));
    }
    let (conn, _) = setup();
    Table::new(&conn, &def).open(true).unwrap();
    conn.attach().unwrap();

    let source = Row::new(&def);
    let mut insert = Statement::new(&conn);
    insert.build("insert into formats set ");
    insert.bind(source.value_at(0), BindMode::InputSet, None).unwrap();
    for index in 1..def.field_count() {
        insert.bind(source.value_at(index), BindMode::InputSet, Some(", ")).unwrap();
    }
    insert.prepare().unwrap();

    let target = Row::new(&def);
    let mut select = Statement::new(&conn);
    select.build("select ");
    select.bind_all_out(&target, None).unwrap();
    select.build(" from formats where ");
    select.bind(target.value("id"), BindMode::InputSet, None).unwrap();
    select.prepare().unwrap();

    // row 1 carries a value in every column, row 2 only nulls
    source.set("id", 1u32).unwrap();
    for (index, (_, value)) in samples.iter().enumerate() {
        source.value_at(index + 1).unwrap().borrow_mut().set(value.clone()).unwrap();
    }
    insert.execute(false).unwrap();
    source.clear();
    source.set("id", 2u32).unwrap();
    insert.execute(false).unwrap();

    target.set("id", 1u32).unwrap();
    assert!(select.find().unwrap());
    for (index, (format, value)) in samples.iter().enumerate() {
        let column = target.value_at(index + 1).unwrap().borrow();
        assert!(!column.is_null(), "{format}");
        assert_eq!(column.get(), Some(value), "{format}");
    }

    target.set("id", 2u32).unwrap();
    assert!(select.find().unwrap());
    for (index, (format, _)) in samples.iter().enumerate() {
        assert!(target.value_at(index + 1).unwrap().borrow().is_null(), "{format}");
    }
    assert_eq!(target.get("id").unwrap().get(), Some(&Value::UInt(2)));
    conn.detach();
}

#[test]
fn test_store_inserts_then_updates() {
    let def = events();
    let (conn, client) = setup();
    let mut table = Table::new(&conn, &def);
    table.open(true).unwrap();

    assert_eq!(store_event(&mut table, 1, "Tagesschau", "news"), StoreOutcome::Inserted);
    assert_eq!(store_event(&mut table, 1, "Tagesschau 20 Uhr", "news"), StoreOutcome::Updated);
    assert_eq!(store_event(&mut table, 2, "Sportschau", "sports"), StoreOutcome::Inserted);

    assert_eq!(client.row_count("events"), Some(2));
    let counts = client.counts();
    assert_eq!((counts.inserts, counts.updates), (2, 1));
    assert_eq!(table.count_where(Some("title = 'Tagesschau 20 Uhr'"), None).unwrap(), 1);
}

#[test]
fn test_find_loads_row() {
    let def = events();
    let (conn, _) = setup();
    let mut table = Table::new(&conn, &def);
    table.open(true).unwrap();
    store_event(&mut table, 7, "Tatort", "crime");

    table.clear_values();
    table.set_value("id", 7u32).unwrap();
    assert!(table.find().unwrap());
    assert_eq!(table.get_value("title"), Some(Value::Text("Tatort".to_string())));
    assert!(matches!(table.get_value("inssp"), Some(Value::DateTime(_))));

    table.set_value("id", 8u32).unwrap();
    assert!(!table.find().unwrap());
}

#[test]
fn test_update_keeps_insert_stamp() {
    let def = events();
    let (conn, _) = setup();
    let mut table = Table::new(&conn, &def);
    table.open(true).unwrap();
    store_event(&mut table, 1, "Tagesschau", "news");
    let inserted = table.get_value("inssp").unwrap();

    table.set_null("inssp").unwrap();
    assert_eq!(store_event(&mut table, 1, "Tagesschau", "news"), StoreOutcome::Updated);

    table.clear_values();
    table.set_value("id", 1u32).unwrap();
    assert!(table.find().unwrap());
    assert_eq!(table.get_value("inssp"), Some(inserted));
}

#[test]
fn test_update_without_match_is_cardinality_error() {
    let def = events();
    let (conn, _) = setup();
    let mut table = Table::new(&conn, &def);
    table.open(true).unwrap();

    table.set_value("id", 99u32).unwrap();
    let err = table.update().unwrap_err();
    assert!(matches!(
        err,
        PersistError::CardinalityError { operation: "update", affected: 0, .. }
    ));
}

#[test]
fn test_duplicate_live_rows_fail_store() {
    let def = events();
    let (conn, _) = setup();
    conn.connect().unwrap();
    // a live table that lost its primary key
    conn.query(
        "setup",
        "create table events(id int(10) unsigned, title varchar(100) comment 'Title', genre varchar(20), inssp datetime, updsp datetime, KEY idxtitle(title))",
    )
    .unwrap();
    conn.query("setup", "insert into events set id = 1, title = 'a'").unwrap();
    conn.query("setup", "insert into events set id = 1, title = 'b'").unwrap();

    let mut table = Table::new(&conn, &def);
    assert!(table.open(false).unwrap().is_empty());

    table.set_value("id", 1u32).unwrap();
    table.set_value("title", "c").unwrap();
    let err = table.store().unwrap_err();
    assert!(matches!(
        err,
        PersistError::CardinalityError { operation: "update", affected: 2, .. }
    ));
}

#[test]
fn test_autoincrement_outside_primary_key() {
    let def = TableDescriptor::new("timers")
        .with_field(FieldDescriptor::new("channel", FieldFormat::Ascii, 50).primary_key())
        .with_field(FieldDescriptor::new("seq", FieldFormat::UBigInt, 0).autoincrement())
        .with_field(FieldDescriptor::new("active", FieldFormat::Int, 1).default_zero());
    let (conn, client) = setup();
    let mut table = Table::new(&conn, &def);
    table.open(true).unwrap();

    assert!(client.ddl_log()[0].contains("KEY(seq DESC)"));

    for (expected, channel) in [(1, "ard"), (2, "zdf")] {
        table.clear_values();
        table.set_value("channel", channel).unwrap();
        table.set_value("active", 1).unwrap();
        table.insert().unwrap();
        assert_eq!(table.last_insert_id(), Some(expected));
        assert_eq!(table.get_value("seq"), Some(Value::UBigInt(expected)));
    }
}

#[test]
fn test_count_delete_truncate() {
    let def = events();
    let (conn, _) = setup();
    let mut table = Table::new(&conn, &def);
    table.open(true).unwrap();
    for (id, genre) in [(1, "news"), (2, "news"), (3, "sports"), (4, "crime")] {
        store_event(&mut table, id, "x", genre);
    }

    assert_eq!(table.count_where(None, None).unwrap(), 4);
    assert_eq!(table.count_where(Some("genre = 'news'"), None).unwrap(), 2);
    assert_eq!(table.delete_where("id >= 3").unwrap(), 2);
    assert_eq!(table.count_where(None, Some("count(*)")).unwrap(), 2);
    assert_eq!(table.truncate().unwrap(), 2);
    assert_eq!(table.count_where(None, None).unwrap(), 0);
}

#[test]
fn test_custom_statement_over_table_row() {
    let def = events();
    let (conn, _) = setup();
    let mut table = Table::new(&conn, &def);
    table.open(true).unwrap();
    for (id, genre) in [(1, "news"), (2, "sports"), (3, "crime"), (4, "news")] {
        store_event(&mut table, id, &format!("event {id}"), genre);
    }

    let mut by_genre = table.statement();
    by_genre.build("select ");
    by_genre.bind_all_out(table.row(), None).unwrap();
    by_genre.build(" from events where ");
    by_genre.bind_in_char(None, table.value("genre"), None, None).unwrap();

    table.set_value("genre", "news,crime").unwrap();
    assert!(table.find_with(&mut by_genre).unwrap());
    assert_eq!(by_genre.affected(), 3);

    let mut ids = vec![table.get_value("id")];
    while table.fetch(&mut by_genre).unwrap() {
        ids.push(table.get_value("id"));
    }
    assert_eq!(ids, vec![Some(Value::UInt(1)), Some(Value::UInt(3)), Some(Value::UInt(4))]);
}

#[test]
fn test_compare_binding_with_separate_value() {
    let def = events();
    let (conn, _) = setup();
    let mut table = Table::new(&conn, &def);
    table.open(true).unwrap();
    for id in 1..=5 {
        store_event(&mut table, id, "x", "news");
    }

    let threshold = table.row().value("id").unwrap().clone();
    let mut newer = table.statement();
    newer.build("select ");
    newer.bind(table.value("title"), BindMode::Output, None).unwrap();
    newer.build(" from events where ");
    newer.bind_cmp(Some("events"), Some(&threshold), None, ">", None).unwrap();
    assert_eq!(newer.text(), "select title from events where events.id > ?");

    table.set_value("id", 3u32).unwrap();
    assert!(table.find_with(&mut newer).unwrap());
    assert_eq!(newer.affected(), 2);
}

// ============================================================================
// Connection loss
// ============================================================================

#[test]
fn test_connection_loss_requires_reconnect_and_reprepare() {
    let def = events();
    let (conn, client) = setup();
    let mut table = Table::new(&conn, &def);
    table.open(true).unwrap();
    store_event(&mut table, 1, "Tagesschau", "news");

    client.fail_next(CR_SERVER_LOST, "Lost connection to MySQL server during query");
    table.set_value("title", "Tagesthemen").unwrap();
    let err = table.store().unwrap_err();
    assert!(err.is_connection_lost());
    assert!(conn.is_dropped());

    conn.reconnect().unwrap();
    assert!(!conn.is_dropped());
    assert!(matches!(table.store(), Err(PersistError::StaleStatement(_))));

    table.reprepare().unwrap();
    assert_eq!(table.store().unwrap(), StoreOutcome::Updated);
    assert_eq!(table.count_where(Some("title = 'Tagesthemen'"), None).unwrap(), 1);
}

#[test]
fn test_statistics_per_statement() {
    let def = events();
    let (conn, _) = setup();
    let mut table = Table::new(&conn, &def);
    table.open(true).unwrap();
    store_event(&mut table, 1, "a", "news");
    store_event(&mut table, 1, "b", "news");

    let stats = conn.take_statistics();
    let calls = |prefix: &str| {
        stats
            .iter()
            .find(|s| s.text.starts_with(prefix))
            .map(|s| s.calls)
            .unwrap_or_default()
    };
    assert_eq!(calls("select"), 2);
    assert_eq!(calls("insert"), 1);
    assert_eq!(calls("update"), 1);

    assert!(conn.take_statistics().iter().all(|s| s.calls == 0));
}

#[test]
fn test_table_from_dictionary() {
    let json = r#"{"tables": [{"name": "channels", "fields": [
        {"name": "id", "format": "ascii", "size": 20, "roles": {"primary_key": true}},
        {"name": "name", "format": "ascii", "size": 50}
    ]}]}"#;
    let dictionary = Dictionary::from_json_str(json).unwrap();
    let (conn, client) = setup();

    let mut channels = Table::from_dictionary(&conn, &dictionary, "channels").unwrap();
    channels.open(true).unwrap();
    channels.set_value("id", "S19.2E-1-1019-10301").unwrap();
    channels.set_value("name", "Das Erste HD").unwrap();
    channels.store().unwrap();
    assert_eq!(client.row_count("channels"), Some(1));

    assert!(matches!(
        Table::from_dictionary(&conn, &dictionary, "events"),
        Err(PersistError::TableNotFound(_))
    ));
}
