//! Command implementations for the folio CLI.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use log::{debug, warn};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::IndexConfig;
use crate::error::Result;
use crate::mapping::{FOLDER_FIELD, FileHit, FileRecord};
use crate::query::{Filter, FilterClause, SortField};
use crate::service::{IndexService, SearchRequest};

/// Execute a CLI command.
pub fn execute_command(args: &FolioArgs) -> Result<()> {
    let service = open_service(args)?;
    let outcome = match &args.command {
        Command::Add(add_args) => add_files(&service, add_args, args),
        Command::Delete(delete_args) => delete_file(&service, delete_args, args),
        Command::Search(search_args) => search_index(&service, search_args, args),
        Command::Optimize(optimize_args) => optimize_index(&service, optimize_args, args),
        Command::Stats(_) => output_result(&service.stats()?, args),
        Command::Clear(_) => clear_index(&service, args),
    };
    let disposed = service.dispose();
    outcome.and(disposed)
}

fn open_service(args: &FolioArgs) -> Result<IndexService> {
    let index_path = args.command.index_path();
    let mut config = match &args.config {
        Some(path) => IndexConfig::load(path)?,
        None => IndexConfig::default(),
    };
    config.index_dir = index_path.clone();
    IndexService::open(config)
}

/// Add files described by JSON lines.
fn add_files(service: &IndexService, args: &AddArgs, cli_args: &FolioArgs) -> Result<()> {
    let start_time = Instant::now();
    let reader: Box<dyn BufRead> = match &args.file {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut files_added = 0;
    let mut lines_skipped = 0;
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<FileRecord>(&line) {
            Ok(record) => {
                service.add(&record.to_index_document())?;
                files_added += 1;

                if !args.no_commit && args.batch_size > 0 && files_added % args.batch_size == 0 {
                    service.commit()?;
                    debug!("Committed {files_added} files");
                }
            }
            Err(e) => {
                warn!("Skipping line {}: {e}", line_num + 1);
                lines_skipped += 1;
            }
        }
    }

    let committed = !args.no_commit;
    if committed {
        service.commit()?;
    }

    output_result(
        &AddResult {
            files_added,
            lines_skipped,
            committed,
            duration_ms: start_time.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

fn delete_file(service: &IndexService, args: &DeleteArgs, cli_args: &FolioArgs) -> Result<()> {
    let deleted = service.delete_by_key(&args.key)?;
    service.commit()?;
    output_result(
        &DeleteResult {
            key: args.key.clone(),
            deleted,
        },
        cli_args,
    )
}

/// Search the index.
fn search_index(service: &IndexService, args: &SearchArgs, cli_args: &FolioArgs) -> Result<()> {
    let start_time = Instant::now();
    let request = build_request(args)?;
    let mut results = service.search(&request, FileHit::from_stored)?;

    let mut removed_missing = 0;
    if let Some(root) = &args.root {
        let before = results.items.len();
        results = service.reconcile(
            results,
            |hit: &FileHit| Some(hit.id.clone()),
            |hit: &FileHit| file_exists(root, hit),
        )?;
        removed_missing = before - results.items.len();
    }

    output_result(
        &SearchOutput {
            items: results.items,
            total_count: results.total_count,
            page_index: args.page_index,
            page_size: args.page_size,
            removed_missing,
            duration_ms: start_time.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

fn build_request(args: &SearchArgs) -> Result<SearchRequest> {
    let sort = args
        .sort
        .iter()
        .map(|s| s.parse::<SortField>())
        .collect::<Result<Vec<_>>>()?;

    let mut request = SearchRequest::new(args.page_size, args.page_index).with_sort(sort);
    if let Some(folder) = &args.folder {
        request = request.with_filter(Filter::from(FilterClause::eq(
            FOLDER_FIELD,
            folder.as_str(),
        )));
    }
    if let Some(text) = args.query.as_deref().filter(|q| !q.trim().is_empty()) {
        request = request.with_text(text);
    }
    Ok(request)
}

fn file_exists(root: &Path, hit: &FileHit) -> bool {
    root.join(&hit.folder).join(&hit.name).exists()
}

fn optimize_index(
    service: &IndexService,
    args: &OptimizeArgs,
    cli_args: &FolioArgs,
) -> Result<()> {
    service.ensure_writer()?;
    let started = service.optimize(args.wait)?;
    output_result(
        &OptimizeResult {
            started,
            waited: args.wait,
        },
        cli_args,
    )
}

fn clear_index(service: &IndexService, cli_args: &FolioArgs) -> Result<()> {
    let cleared = service.delete_all()?;
    if cleared {
        service.commit()?;
    }
    output_result(&ClearResult { cleared }, cli_args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> FolioArgs {
        FolioArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_build_request() {
        let args = parse(&[
            "folio", "search", "/i", "--folder", "~/docs/", "-Q", "report", "--sort",
            "name:desc",
        ]);
        let Command::Search(search_args) = &args.command else {
            panic!("Expected Search command");
        };
        let request = build_request(search_args).unwrap();
        assert_eq!(request.text.as_deref(), Some("report"));
        assert_eq!(request.sort, vec![SortField::field_desc("name")]);
        assert_eq!(
            request.filter.unwrap().clauses(),
            &[FilterClause::eq("folder", "~/docs/")]
        );

        let args = parse(&["folio", "search", "/i", "--sort", "name:sideways"]);
        let Command::Search(search_args) = &args.command else {
            panic!("Expected Search command");
        };
        assert!(build_request(search_args).is_err());
    }

    #[test]
    fn test_add_search_and_reconcile() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index");
        let root = dir.path().join("files");
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("docs").join("a.txt"), b"alpha").unwrap();

        let input = dir.path().join("files.jsonl");
        let mut file = File::create(&input).unwrap();
        writeln!(file, r#"{{"id":"1","name":"a.txt","folder":"docs","content":"alpha"}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, r#"{{"id":"2","name":"b.txt","folder":"docs","content":"alpha"}}"#).unwrap();
        drop(file);

        let index_arg = index.to_str().unwrap();
        let args = parse(&["folio", "-f", "json", "add", index_arg, input.to_str().unwrap()]);
        execute_command(&args).unwrap();

        let args = parse(&[
            "folio", "-f", "json", "search", index_arg, "--folder", "docs", "--root",
            root.to_str().unwrap(),
        ]);
        execute_command(&args).unwrap();

        // b.txt does not exist on disk and was removed from the index
        let service = IndexService::open(IndexConfig::new(&index)).unwrap();
        assert_eq!(service.num_docs().unwrap(), 1);
    }

    #[test]
    fn test_clear_and_optimize() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index");
        let index_arg = index.to_str().unwrap();

        // Nothing to clear yet
        execute_command(&parse(&["folio", "clear", index_arg])).unwrap();

        let service = IndexService::open(IndexConfig::new(&index)).unwrap();
        for id in ["1", "2", "3"] {
            service
                .add(&FileRecord::new(id, "a.txt", "docs").to_index_document())
                .unwrap();
        }
        service.commit().unwrap();
        service.delete_by_key("1").unwrap();
        service.dispose().unwrap();

        execute_command(&parse(&["folio", "optimize", index_arg, "--wait"])).unwrap();
        execute_command(&parse(&["folio", "stats", index_arg])).unwrap();
        execute_command(&parse(&["folio", "clear", index_arg])).unwrap();

        let service = IndexService::open(IndexConfig::new(&index)).unwrap();
        assert_eq!(service.num_docs().unwrap(), 0);
    }
}
