mod support;

use flydb::{
    Connection, DatabaseErrorKind, ErrorKind, Value,
    protocol::{Message, MessageType},
};
use serde::Deserialize;
use serde_json::json;

use support::{FakeServer, default_response, error, field, query_result, reply};

fn users_server() -> FakeServer {
    FakeServer::start(|request| {
        if request.msg_type != MessageType::Query {
            return Some(default_response(request));
        }
        let response = match field(&request.payload, "query") {
            q if q.starts_with("SELECT") => query_result("1, 'Alice'\n2, 'Bob'\n3, NULL\n(3 rows)"),
            q if q.starts_with("INSERT") => query_result("INSERT 1"),
            q if q.starts_with("UPDATE") => query_result("UPDATE 2"),
            "CREATE TABLE users (id INT, name TEXT)" => query_result("CREATE TABLE OK"),
            "DUPLICATE" => error("duplicate key value", 23505),
            "FAIL" => reply(
                MessageType::QueryResult,
                json!({ "success": false, "message": "syntax error near FAIL" }),
            ),
            _ => query_result("OK"),
        };
        Some(response)
    })
}

#[test]
fn select_and_fetch() {
    let server = users_server();
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    cursor.execute("SELECT * FROM users", ()).unwrap();
    assert_eq!(cursor.rowcount(), Some(3));
    let description = cursor.description().unwrap();
    assert_eq!(description.len(), 2);
    assert_eq!(description[0].name, "column_0");

    let first = cursor.fetchone().unwrap().unwrap();
    assert_eq!(first[0], Value::Int(1));
    assert_eq!(first["column_1"], Value::Text("Alice".into()));

    let rest = cursor.fetchall().unwrap();
    assert_eq!(rest.len(), 2);
    assert_eq!(rest[1].values(), [Value::Int(3), Value::Null]);

    assert!(cursor.fetchone().unwrap().is_none());
    assert!(cursor.fetchone().unwrap().is_none());
    assert!(cursor.fetchall().unwrap().is_empty());

    drop(cursor);
    drop(conn);
    server.finish();
}

#[test]
fn fetchmany_uses_arraysize() {
    let server = users_server();
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    cursor.execute("SELECT * FROM users", ()).unwrap();
    assert_eq!(cursor.fetchmany(None).unwrap().len(), 1);

    cursor.arraysize = 5;
    assert_eq!(cursor.fetchmany(Some(1)).unwrap().len(), 1);
    assert_eq!(cursor.fetchmany(None).unwrap().len(), 1);
    assert!(cursor.fetchmany(None).unwrap().is_empty());

    drop(cursor);
    drop(conn);
    server.finish();
}

#[test]
fn cursor_iterates_rows() {
    let server = users_server();
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    cursor.execute("SELECT * FROM users", ()).unwrap();
    let names: Vec<Value> = cursor.by_ref().map(|row| row[1].clone()).collect();
    assert_eq!(
        names,
        [
            Value::Text("Alice".into()),
            Value::Text("Bob".into()),
            Value::Null
        ]
    );

    drop(cursor);
    drop(conn);
    server.finish();
}

#[test]
fn status_results() {
    let server = users_server();
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    cursor
        .execute("CREATE TABLE users (id INT, name TEXT)", ())
        .unwrap();
    assert_eq!(cursor.rowcount(), Some(0));
    assert!(cursor.description().is_none());

    cursor.execute("UPDATE users SET name = 'x'", ()).unwrap();
    assert_eq!(cursor.rowcount(), Some(2));
    assert!(cursor.description().is_none());
    assert!(cursor.fetchone().unwrap().is_none());

    drop(cursor);
    drop(conn);
    server.finish();
}

#[test]
fn execute_binds_parameters() {
    let server = users_server();
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    cursor
        .execute(
            "INSERT INTO users VALUES (%s, %s)",
            [Value::from(1), Value::from("O'Brien")],
        )
        .unwrap();
    assert_eq!(cursor.rowcount(), Some(1));
    assert_eq!(
        cursor.last_query(),
        Some("INSERT INTO users VALUES (1, 'O''Brien')")
    );

    cursor
        .execute(
            "SELECT * FROM users WHERE name = %(name)s AND pct LIKE '10%%'",
            [("name", Value::from("Bob"))],
        )
        .unwrap();

    drop(cursor);
    drop(conn);
    let received = server.finish();
    assert_eq!(
        field(&received[1].payload, "query"),
        "SELECT * FROM users WHERE name = 'Bob' AND pct LIKE '10%'"
    );
}

#[test]
fn parameter_mismatch_sends_nothing() {
    let server = users_server();
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    let err = cursor
        .execute("INSERT INTO users VALUES (%s, %s)", [Value::from(1)])
        .unwrap_err();
    assert_eq!(
        err.kind(),
        ErrorKind::Database(DatabaseErrorKind::Programming)
    );
    assert_eq!(err.message(), "query requires 2 parameters, but 1 provided");

    let err = cursor
        .execute("SELECT %(missing)s", [("id", Value::from(1))])
        .unwrap_err();
    assert_eq!(
        err.kind(),
        ErrorKind::Database(DatabaseErrorKind::Programming)
    );

    drop(cursor);
    drop(conn);
    assert!(server.finish().is_empty());
}

#[test]
fn failed_query_is_query_error() {
    let server = users_server();
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    let err = cursor.execute("FAIL", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Query);
    assert_eq!(err.message(), "syntax error near FAIL");

    // the connection stays usable
    cursor.execute("SELECT * FROM users", ()).unwrap();
    assert_eq!(cursor.rowcount(), Some(3));

    drop(cursor);
    drop(conn);
    server.finish();
}

#[test]
fn server_error_carries_code() {
    let server = users_server();
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    cursor.execute("SELECT * FROM users", ()).unwrap();
    let err = cursor.execute("DUPLICATE", ()).unwrap_err();
    assert!(err.is_database());
    assert_eq!(err.code(), Some(23505));
    assert_eq!(err.message(), "duplicate key value");

    // the failed execute discarded the previous result
    assert!(cursor.fetchone().unwrap().is_none());
    assert_eq!(cursor.rowcount(), None);
    assert_eq!(cursor.last_query(), Some("DUPLICATE"));

    drop(cursor);
    drop(conn);
    server.finish();
}

#[test]
fn executemany_sums_rowcount() {
    let server = users_server();
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    cursor
        .executemany(
            "INSERT INTO users VALUES (%s, %s)",
            [
                [Value::from(1), Value::from("Alice")],
                [Value::from(2), Value::from("Bob")],
                [Value::from(3), Value::Null],
            ],
        )
        .unwrap();
    assert_eq!(cursor.rowcount(), Some(3));

    drop(cursor);
    drop(conn);
    let received = server.finish();
    assert_eq!(received.len(), 3);
    assert_eq!(
        field(&received[2].payload, "query"),
        "INSERT INTO users VALUES (3, NULL)"
    );
}

#[test]
fn closed_cursor_rejects_operations() {
    let server = users_server();
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    cursor.execute("SELECT * FROM users", ()).unwrap();
    cursor.close();
    cursor.close();
    assert!(cursor.is_closed());

    assert_eq!(cursor.fetchone().unwrap_err().kind(), ErrorKind::Interface);
    assert_eq!(
        cursor.execute("SELECT 1", ()).unwrap_err().kind(),
        ErrorKind::Interface
    );
    assert!(cursor.next().is_none());

    drop(cursor);
    drop(conn);
    server.finish();
}

#[test]
fn cursor_after_connection_close() {
    let server = users_server();
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    conn.close();
    let err = cursor.execute("SELECT * FROM users", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interface);
    assert_eq!(conn.cursor().err().unwrap().kind(), ErrorKind::Interface);

    drop(cursor);
    drop(conn);
    assert!(server.finish().is_empty());
}

#[test]
fn structured_payload_rows() {
    let server = FakeServer::start(|request| match request.msg_type {
        MessageType::Query => Some(reply(
            MessageType::QueryResult,
            json!({
                "success": true,
                "message": "",
                "columns": ["id", "name"],
                "rows": [[1, "Alice"], [2, "Bob"]],
                "row_count": 2,
            }),
        )),
        _ => Some(default_response(request)),
    });
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        name: String,
    }

    cursor.execute("SELECT id, name FROM users", ()).unwrap();
    assert_eq!(cursor.rowcount(), Some(2));
    assert_eq!(cursor.description().unwrap()[1].name, "name");

    let users: Vec<User> = cursor.fetchall_as().unwrap();
    assert_eq!(
        users,
        [
            User {
                id: 1,
                name: "Alice".into()
            },
            User {
                id: 2,
                name: "Bob".into()
            }
        ]
    );

    drop(cursor);
    drop(conn);
    server.finish();
}

#[test]
fn execute_prepared_statement() {
    let server = FakeServer::start(|request| match request.msg_type {
        MessageType::Prepare => Some(reply(MessageType::PrepareResult, json!({ "success": true }))),
        MessageType::Execute => Some(query_result("1, 'Alice'\n(1 row)")),
        _ => Some(default_response(request)),
    });
    let conn = Connection::connect(server.config()).unwrap();

    conn.prepare("by_id", "SELECT * FROM users WHERE id = $1")
        .unwrap();
    let mut cursor = conn.cursor().unwrap();
    cursor.execute_prepared("by_id", &[Value::from(1)]).unwrap();

    assert_eq!(cursor.rowcount(), Some(1));
    let row = cursor.fetchone().unwrap().unwrap();
    assert_eq!(row.values(), [Value::Int(1), Value::Text("Alice".into())]);

    drop(cursor);
    drop(conn);
    let received = server.finish();
    assert_eq!(received[1].msg_type, MessageType::Execute);
    assert_eq!(received[1].payload["params"], json!([1]));
}

#[test]
fn unexpected_response_type_is_protocol_error() {
    let server = FakeServer::start(|request| match request.msg_type {
        MessageType::Query => Some(Message::empty(MessageType::Pong)),
        _ => Some(default_response(request)),
    });
    let conn = Connection::connect(server.config()).unwrap();
    let mut cursor = conn.cursor().unwrap();

    let err = cursor.execute("SELECT 1", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(!conn.is_closed());

    drop(cursor);
    drop(conn);
    server.finish();
}
