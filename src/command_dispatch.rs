//! Purpose: Hold top-level CLI command dispatch for `tablekv`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: One tokio runtime per invocation; each command opens the store it names.
//! Invariants: Helpers in `main.rs` own parsing and output envelopes.

use super::*;

pub(super) fn dispatch_command(command: Command, store_dir: PathBuf) -> Result<RunOutcome, Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start runtime")
                .with_source(err)
        })?;
    let client = LocalClient::with_options(StoreOptions::new().with_store_dir(&store_dir));
    runtime.block_on(run_command(command, client))
}

async fn run_command(command: Command, client: LocalClient) -> Result<RunOutcome, Error> {
    match command {
        Command::Put { store, key, value } => {
            let key = parse_key(&key)?;
            let value = parse_value(&value)?;
            let handle = client.open(store.as_str()).await?;
            handle.put(key.clone(), value).await?;
            emit_json(json!({ "store": store, "put": Value::from(&key) }));
            Ok(RunOutcome::ok())
        }
        Command::Get { store, key } => {
            let key = parse_key(&key)?;
            let handle = client.open(store.as_str()).await?;
            let value = handle.get(&key).await?;
            emit_json(record_json(&key, &value));
            Ok(RunOutcome::ok())
        }
        Command::Has { store, key } => {
            let key = parse_key(&key)?;
            let handle = client.open(store.as_str()).await?;
            let present = handle.has(&key).await?;
            emit_json(json!({ "key": Value::from(&key), "present": present }));
            Ok(RunOutcome::ok())
        }
        Command::Del { store, key } => {
            let key = parse_key(&key)?;
            let handle = client.open(store.as_str()).await?;
            handle.del(&key).await?;
            emit_json(json!({ "store": store, "deleted": Value::from(&key) }));
            Ok(RunOutcome::ok())
        }
        Command::Count { store } => {
            let handle = client.open(store.as_str()).await?;
            let count = handle.count().await?;
            emit_json(json!({ "store": store, "count": count }));
            Ok(RunOutcome::ok())
        }
        Command::Clear { store } => {
            let handle = client.open(store.as_str()).await?;
            handle.clear().await?;
            emit_json(json!({ "store": store, "cleared": true }));
            Ok(RunOutcome::ok())
        }
        Command::Batch { store, ops, file } => {
            let text = match (ops, file) {
                (Some(ops), None) => ops,
                (None, Some(file)) => read_batch_input(&file)?,
                _ => {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message("batch needs inline operations or --file")
                        .with_hint("Use `tablekv batch <store> '[...]'` or `-f ops.json`."));
                }
            };
            let ops = parse_batch(&text)?;
            let applied = ops
                .iter()
                .filter(|op| !matches!(op, BatchOp::Unknown))
                .count();
            let skipped = ops.len() - applied;
            let handle = client.open(store.as_str()).await?;
            handle.batch(ops).await?;
            emit_json(json!({ "store": store, "applied": applied, "skipped": skipped }));
            Ok(RunOutcome::ok())
        }
        Command::Read {
            store,
            gt,
            gte,
            lt,
            lte,
            limit,
            reverse,
            timeout_ms,
        } => {
            let options = read_options(gt, gte, lt, lte, limit, reverse, timeout_ms)?;
            let handle = client.open(store.as_str()).await?;
            let mut stream = handle.read(options)?;
            while let Some(event) = stream.next_event().await {
                match event {
                    ReadEvent::Data(record) => emit_line(record_json(&record.key, &record.value)),
                    ReadEvent::Error(err) => return Err(err),
                    ReadEvent::End => break,
                }
            }
            Ok(RunOutcome::ok())
        }
        Command::Drop { stores } => {
            let mut dropped = Vec::new();
            for store in stores {
                client.drop_store(store.as_str()).await?;
                dropped.push(store);
            }
            emit_json(json!({ "dropped": dropped }));
            Ok(RunOutcome::ok())
        }
        Command::List => {
            let stores = client
                .list_stores()?
                .into_iter()
                .map(|info| {
                    json!({
                        "name": info.name,
                        "path": info.path.display().to_string(),
                        "file_size": info.file_size,
                    })
                })
                .collect::<Vec<_>>();
            emit_json(json!({ "stores": stores }));
            Ok(RunOutcome::ok())
        }
    }
}
