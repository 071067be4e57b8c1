//! Purpose: `tablekv` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Successful commands emit JSON (JSON Lines for `read`) on stdout.
//! Invariants: Errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All store access goes through `api::Store` / `api::LocalClient`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use tablekv::api::{
    BatchOp, Error, ErrorKind, Key, LocalClient, ReadEvent, ReadOptions, StoreOptions,
    default_store_dir, to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `tablekv --help` for usage."));
            }
        },
    };

    let store_dir = cli.dir.unwrap_or_else(default_store_dir);
    command_dispatch::dispatch_command(cli.command, store_dir)
        .map_err(add_busy_hint)
        .map_err(add_corrupt_hint)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "tablekv",
    version,
    about = "Ordered key-value stores for JSON values, one file per store",
    long_about = None,
    after_help = r#"EXAMPLES
  $ tablekv put todos '"a"' '{"title": "milk"}'
  $ tablekv get todos a
  $ tablekv read todos --gte '"a"' --limit 10
  $ tablekv batch todos '[{"type":"put","key":1,"value":true},{"type":"del","key":"a"}]'
  $ tablekv list

NOTES
  - Keys are JSON: numbers, strings, arrays, {"$date": ms}, {"$binary": "hex"}
  - A key that is not valid JSON is taken as a plain string
  - Default location: $TABLEKV_DIR, else ~/.tablekv/stores (override with --dir)"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "Store directory for named stores (default: ~/.tablekv/stores)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Insert or replace a value")]
    Put {
        store: String,
        #[arg(help = "Key (JSON, or a plain string)")]
        key: String,
        #[arg(help = "Value (JSON)")]
        value: String,
    },
    #[command(about = "Print the value stored under a key")]
    Get { store: String, key: String },
    #[command(about = "Report whether a key is present")]
    Has { store: String, key: String },
    #[command(about = "Remove a key (absent keys are fine)")]
    Del { store: String, key: String },
    #[command(about = "Count records")]
    Count { store: String },
    #[command(about = "Remove every record")]
    Clear { store: String },
    #[command(
        about = "Apply puts and deletes atomically",
        after_help = r#"Operations are a JSON array of {"type": "put"|"del", "key": .., "value": ..}.
Unknown types are skipped."#
    )]
    Batch {
        store: String,
        #[arg(help = "Inline JSON array of operations")]
        ops: Option<String>,
        #[arg(
            short = 'f',
            long = "file",
            help = "Read operations from a file (use - for stdin)",
            conflicts_with = "ops",
            value_hint = ValueHint::FilePath
        )]
        file: Option<String>,
    },
    #[command(about = "Stream records in key order as JSON Lines")]
    Read {
        store: String,
        #[arg(long, help = "Lower bound, exclusive (wins over --gte)")]
        gt: Option<String>,
        #[arg(long, help = "Lower bound, inclusive")]
        gte: Option<String>,
        #[arg(long, help = "Upper bound, exclusive (wins over --lte)")]
        lt: Option<String>,
        #[arg(long, help = "Upper bound, inclusive")]
        lte: Option<String>,
        #[arg(long, help = "Stop after N records")]
        limit: Option<usize>,
        #[arg(long, help = "Descending key order")]
        reverse: bool,
        #[arg(long = "timeout-ms", help = "Fail if no record arrives within this many ms")]
        timeout_ms: Option<u64>,
    },
    #[command(about = "Delete store files")]
    Drop {
        #[arg(required = true)]
        stores: Vec<String>,
    },
    #[command(about = "List stores in the store directory")]
    List,
}

/// Parse a command-line key as JSON, falling back to the raw text as a string key.
fn parse_key(text: &str) -> Result<Key, Error> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Key::try_from(value),
        Err(_) => Ok(Key::from(text)),
    }
}

fn parse_value(text: &str) -> Result<Value, Error> {
    serde_json::from_str(text).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("value is not valid JSON")
            .with_hint("Quote strings as JSON, e.g. '\"hello\"'.")
            .with_source(err)
    })
}

fn parse_batch(text: &str) -> Result<Vec<BatchOp>, Error> {
    serde_json::from_str(text).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("batch must be a JSON array of operations")
            .with_hint(r#"Each operation looks like {"type":"put","key":..,"value":..}."#)
            .with_source(err)
    })
}

fn read_batch_input(file: &str) -> Result<String, Error> {
    let mut text = String::new();
    let result = if file == "-" {
        io::stdin().read_to_string(&mut text).map(|_| ())
    } else {
        std::fs::read_to_string(file).map(|contents| text = contents)
    };
    result.map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read batch input")
            .with_path(file)
            .with_source(err)
    })?;
    Ok(text)
}

fn read_options(
    gt: Option<String>,
    gte: Option<String>,
    lt: Option<String>,
    lte: Option<String>,
    limit: Option<usize>,
    reverse: bool,
    timeout_ms: Option<u64>,
) -> Result<ReadOptions, Error> {
    let mut options = ReadOptions::new().reverse(reverse);
    options.range.gt = gt.as_deref().map(parse_key).transpose()?;
    options.range.gte = gte.as_deref().map(parse_key).transpose()?;
    options.range.lt = lt.as_deref().map(parse_key).transpose()?;
    options.range.lte = lte.as_deref().map(parse_key).transpose()?;
    options.limit = limit;
    options.timeout = timeout_ms.map(Duration::from_millis);
    Ok(options)
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    println!(
        "{}",
        json.unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string())
    );
}

fn emit_line(value: Value) {
    let json = serde_json::to_string(&value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Busy => "resource is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Timeout => "timed out".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(key) = err.key() {
        inner.insert("key".to_string(), json!(key));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn add_busy_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Busy || err.hint().is_some() {
        return err;
    }
    err.with_hint("Another process has the store open; retry once it exits.")
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint("The store file may be damaged; `tablekv drop` it and rebuild from source data.")
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error: ").to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn record_json(key: &Key, value: &Value) -> Value {
    json!({ "key": Value::from(key), "value": value })
}

#[cfg(test)]
mod tests {
    use super::{error_json, parse_batch, parse_key, parse_value};
    use tablekv::api::{BatchOp, Error, ErrorKind, Key};

    #[test]
    fn cli_keys_parse_as_json_then_string() {
        assert_eq!(parse_key("42").expect("num"), Key::from(42));
        assert_eq!(parse_key("\"a\"").expect("str"), Key::from("a"));
        assert_eq!(parse_key("plain").expect("plain"), Key::from("plain"));
        assert_eq!(
            parse_key("[1,\"x\"]").expect("array"),
            Key::from(vec![Key::from(1), Key::from("x")])
        );
    }

    #[test]
    fn json_that_is_not_a_key_is_rejected() {
        let err = parse_key("true").expect_err("bool");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn values_must_be_json() {
        assert!(parse_value("{\"a\":1}").is_ok());
        let err = parse_value("{nope").expect_err("bad");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn batch_text_decodes() {
        let ops = parse_batch(r#"[{"type":"del","key":"a"},{"type":"zap"}]"#).expect("ops");
        assert_eq!(ops, vec![BatchOp::del("a"), BatchOp::Unknown]);
    }

    #[test]
    fn error_json_carries_kind_and_key() {
        let err = Error::new(ErrorKind::NotFound)
            .with_message("key not found")
            .with_key("\"a\"");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "NotFound");
        assert_eq!(value["error"]["key"], "\"a\"");
    }
}
