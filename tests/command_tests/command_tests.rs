//! Tests for the command layer
//!
//! These tests verify:
//! - GET / SET / PING replies
//! - Case-insensitive command names
//! - Arity and unknown-command errors
//! - Storage errors surfaced as error replies
//! - Custom command registration

use bytes::Bytes;
use splitkv::command::CommandTable;
use splitkv::config::{Config, WalSyncStrategy};
use splitkv::engine::Engine;
use splitkv::protocol::Response;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .meta_dir(temp_dir.path().join("meta"))
        .value_dir(temp_dir.path().join("data"))
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

fn request(parts: &[&[u8]]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
}

fn run(table: &CommandTable, engine: &Engine, parts: &[&[u8]]) -> Response {
    table.dispatch(engine, &request(parts))
}

// =============================================================================
// GET / SET Tests
// =============================================================================

#[test]
fn test_get_missing_is_null() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();

    assert_eq!(run(&table, &engine, &[b"GET", b"nope"]), Response::Null);
}

#[test]
fn test_set_replies_with_key() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();

    let reply = run(&table, &engine, &[b"SET", b"A", b"1"]);
    assert_eq!(reply, Response::bulk(&b"A"[..]));
}

#[test]
fn test_set_then_get() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();

    run(&table, &engine, &[b"SET", b"A", b"1"]);
    assert_eq!(run(&table, &engine, &[b"GET", b"A"]), Response::bulk(&b"1"[..]));

    run(&table, &engine, &[b"SET", b"A", b"2"]);
    assert_eq!(run(&table, &engine, &[b"GET", b"A"]), Response::bulk(&b"2"[..]));
}

#[test]
fn test_binary_safe_values() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();

    run(&table, &engine, &[b"SET", b"bin", b"\r\n\x00\xff"]);
    assert_eq!(
        run(&table, &engine, &[b"GET", b"bin"]),
        Response::bulk(&b"\r\n\x00\xff"[..])
    );
}

#[test]
fn test_command_names_case_insensitive() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();

    run(&table, &engine, &[b"set", b"k", b"v"]);
    assert_eq!(run(&table, &engine, &[b"GeT", b"k"]), Response::bulk(&b"v"[..]));
    assert!(table.contains(b"PING"));
    assert!(table.contains(b"ping"));
    assert!(!table.contains(b"del"));
}

// =============================================================================
// PING Tests
// =============================================================================

#[test]
fn test_ping() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();

    assert_eq!(run(&table, &engine, &[b"PING"]), Response::simple("PONG"));
}

#[test]
fn test_ping_with_message() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();

    assert_eq!(run(&table, &engine, &[b"PING", b"hello"]), Response::simple("PONG hello"));
}

#[test]
fn test_ping_echoes_non_utf8_bytes() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();

    let reply = run(&table, &engine, &[b"PING", b"\xff\xfe"]);
    assert_eq!(&reply.encode()[..], b"+PONG \xff\xfe\r\n");
}

#[test]
fn test_ping_message_with_newline_is_bulk() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();

    assert_eq!(
        run(&table, &engine, &[b"PING", b"a\r\nb"]),
        Response::bulk("PONG a\r\nb")
    );
}

// =============================================================================
// Error Reply Tests
// =============================================================================

#[test]
fn test_unknown_command() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();

    assert_eq!(
        run(&table, &engine, &[b"DEL", b"k"]),
        Response::error("ERR unknown command 'DEL'")
    );
}

#[test]
fn test_wrong_arity() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();

    assert_eq!(
        run(&table, &engine, &[b"GET"]),
        Response::error("ERR wrong number of arguments for 'get' command")
    );
    assert_eq!(
        run(&table, &engine, &[b"SET", b"k"]),
        Response::error("ERR wrong number of arguments for 'set' command")
    );
    assert_eq!(
        run(&table, &engine, &[b"PING", b"a", b"b"]),
        Response::error("ERR wrong number of arguments for 'ping' command")
    );

    // Arity errors never reach storage
    assert_eq!(engine.memtable_entry_count(), 0);
}

#[test]
fn test_storage_error_becomes_error_reply() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();
    engine.close().unwrap();

    let set = run(&table, &engine, &[b"SET", b"k", b"v"]);
    let get = run(&table, &engine, &[b"GET", b"k"]);

    assert_eq!(set, Response::error("ERR Engine is closed"));
    assert_eq!(get, Response::error("ERR Engine is closed"));
}

#[test]
fn test_empty_request() {
    let (_temp, engine) = setup_temp_engine();
    let table = CommandTable::with_default_commands();

    assert!(table.dispatch(&engine, &[]).is_error());
}

// =============================================================================
// Registration Tests
// =============================================================================

fn echo(_engine: &Engine, args: &[Bytes]) -> Response {
    match args.get(1) {
        Some(arg) => Response::Bulk(arg.clone()),
        None => Response::Null,
    }
}

#[test]
fn test_register_custom_command() {
    let (_temp, engine) = setup_temp_engine();
    let mut table = CommandTable::new();
    table.register("ECHO", echo);

    assert_eq!(run(&table, &engine, &[b"echo", b"hi"]), Response::bulk(&b"hi"[..]));
    assert!(run(&table, &engine, &[b"PING"]).is_error());
}
