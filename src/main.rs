use clap::{Parser, Subcommand};
use pixelvault::config;
use pixelvault::engine::TransformEngine;
use pixelvault::error::{FieldError, PipelineError};
use pixelvault::imaging::RustBackend;
use pixelvault::ingest::{Upload, UploadIngestor};
use pixelvault::listing::Catalog;
use pixelvault::output;
use pixelvault::storage::FileStore;
use pixelvault::store::{SqliteStore, StoreError};
use pixelvault::transform::{self, TransformationSet};
use pixelvault::types::{FileType, Owner, RequestContext, StoredArtifact};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pixelvault")]
#[command(about = "Image ingestion and transformation pipeline")]
#[command(long_about = "\
Image ingestion and transformation pipeline

Uploads are normalized (large images are downscaled to 800px wide) and stored
under random names. Transforms derive new artifacts from stored ones:

  resize   exact width x height, each at least 200px
  crop     x,y offset plus width x height, each at least 100px
  format   png or jpeg

Steps always run resize, then crop, then format. Every command prints a JSON
envelope on stdout; logs go to stderr (set RUST_LOG to adjust).

Run 'pixelvault gen-config' to generate a documented pixelvault.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::CONFIG_FILE_NAME, global = true)]
    config: PathBuf,

    /// Host name used in public URLs (defaults to server.host)
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommand,
    },
    /// Upload one or more PNG/JPEG files
    Upload {
        /// Owning user
        #[arg(long)]
        user: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Derive a new artifact from a stored one
    Transform {
        #[arg(long)]
        user: String,
        /// Source artifact id
        id: String,
        /// Full request body, e.g. '{"transformations":{"format":"png"}}'
        #[arg(long, conflicts_with_all = ["resize", "crop", "format"])]
        json: Option<String>,
        /// Resize to WIDTHxHEIGHT
        #[arg(long, value_name = "WxH", value_parser = parse_size)]
        resize: Option<(i64, i64)>,
        /// Crop X,Y,WIDTH,HEIGHT
        #[arg(long, value_name = "X,Y,W,H", value_parser = parse_region)]
        crop: Option<(i64, i64, i64, i64)>,
        /// Re-encode as png or jpeg
        #[arg(long)]
        format: Option<String>,
    },
    /// Show one stored artifact
    Get {
        #[arg(long)]
        user: String,
        id: String,
    },
    /// List a user's artifacts
    List {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
    /// Print the accepted transformation keys as JSON
    Capabilities,
    /// Print a stock pixelvault.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum UserCommand {
    /// Register a user
    Add { username: String },
}

#[derive(Serialize)]
struct UserResponse {
    id: i64,
    username: String,
}

fn parse_size(raw: &str) -> Result<(i64, i64), String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {raw}"))?;
    let parse = |s: &str| s.trim().parse::<i64>().map_err(|e| format!("{s}: {e}"));
    Ok((parse(w)?, parse(h)?))
}

fn parse_region(raw: &str) -> Result<(i64, i64, i64, i64), String> {
    let parts = raw
        .split(',')
        .map(|s| s.trim().parse::<i64>().map_err(|e| format!("{s}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [x, y, w, h] => Ok((*x, *y, *w, *h)),
        _ => Err(format!("expected X,Y,WIDTH,HEIGHT, got {raw}")),
    }
}

/// Build the same request body an HTTP client would send.
fn flags_to_body(
    resize: Option<(i64, i64)>,
    crop: Option<(i64, i64, i64, i64)>,
    format: Option<String>,
) -> Value {
    let mut transformations = Map::new();
    if let Some((width, height)) = resize {
        transformations.insert("resize".into(), json!({ "width": width, "height": height }));
    }
    if let Some((x, y, width, height)) = crop {
        transformations.insert(
            "crop".into(),
            json!({ "x": x, "y": y, "width": width, "height": height }),
        );
    }
    if let Some(format) = format {
        transformations.insert("format".into(), Value::String(format));
    }
    json!({ "transformations": transformations })
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Capabilities => {
            println!("{}", output::format_success(transform::capabilities())?);
            return Ok(ExitCode::SUCCESS);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let mut service_config = config::load_config(&cli.config)?;
    service_config.apply_env_overrides(|key| std::env::var(key).ok())?;
    debug!(config = %cli.config.display(), "configuration loaded");

    let store = SqliteStore::open(Path::new(&service_config.storage.database))?;
    let files = FileStore::open(&service_config.storage.root)?;
    let backend = RustBackend::with_quality(service_config.jpeg_quality());
    let ctx = RequestContext {
        secure: service_config.server.secure,
        host: cli
            .host
            .clone()
            .unwrap_or_else(|| service_config.server.host.clone()),
    };

    let ok = match cli.command {
        Command::User {
            action: UserCommand::Add { username },
        } => {
            let result = add_user(&store, &username);
            output::print_result(&result, |user| output::format_success(user))?;
            result.is_ok()
        }
        Command::Upload { user, files: paths } => match resolve_owner(&store, &user) {
            Err(e) => {
                let failed: Result<StoredArtifact, PipelineError> = Err(e);
                output::print_result(&failed, output::format_artifact)?;
                false
            }
            Ok(owner) => {
                init_thread_pool(&service_config.processing);
                let ingestor = UploadIngestor::new(&backend, &store, &files, &service_config);
                let max_size = service_config.upload.max_size;
                let results: Vec<Result<StoredArtifact, PipelineError>> = paths
                    .par_iter()
                    .map(|path| {
                        let upload = read_upload(path, max_size)?;
                        ingestor.ingest(&owner, upload, &ctx)
                    })
                    .collect();
                let mut all_ok = true;
                for (path, result) in paths.iter().zip(&results) {
                    if let Err(e) = result {
                        log_failure(e, &path.display().to_string());
                        all_ok = false;
                    }
                    output::print_result(result, output::format_artifact)?;
                }
                all_ok
            }
        },
        Command::Transform {
            user,
            id,
            json,
            resize,
            crop,
            format,
        } => {
            let engine = TransformEngine::new(&backend, &store, &files, &service_config);
            let result = resolve_owner(&store, &user).and_then(|owner| match json {
                Some(body) => engine.transform_json(&owner, &id, &body, &ctx),
                None => {
                    let set = TransformationSet::from_value(&flags_to_body(resize, crop, format))?;
                    engine.transform(&owner, &id, &set, &ctx)
                }
            });
            if let Err(e) = &result {
                log_failure(e, &id);
            }
            output::print_result(&result, output::format_artifact)?;
            result.is_ok()
        }
        Command::Get { user, id } => {
            let catalog = Catalog::new(&store, &service_config);
            let result =
                resolve_owner(&store, &user).and_then(|owner| catalog.retrieve(&owner, &id, &ctx));
            output::print_result(&result, output::format_retrieved)?;
            result.is_ok()
        }
        Command::List { user, page, limit } => {
            let catalog = Catalog::new(&store, &service_config);
            let result =
                resolve_owner(&store, &user).and_then(|owner| catalog.list(&owner, page, limit));
            output::print_result(&result, output::format_listing)?;
            result.is_ok()
        }
        Command::Capabilities | Command::GenConfig => true,
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Initialize the rayon thread pool based on processing config.
///
/// Never exceeds the number of available cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Stand-in for the session layer: a known username is an authenticated owner.
fn resolve_owner(store: &SqliteStore, username: &str) -> Result<Owner, PipelineError> {
    match store.find_user_by_name(username)? {
        Some(user) => user.owner(),
        None => Err(PipelineError::Unauthorized),
    }
}

fn add_user(store: &SqliteStore, username: &str) -> Result<UserResponse, PipelineError> {
    if username.trim().is_empty() {
        return Err(PipelineError::Validation(vec![FieldError::at(
            &["username"],
            "Required",
        )]));
    }
    match store.create_user(username) {
        Ok(user) => Ok(UserResponse {
            id: user.id,
            username: user.username,
        }),
        Err(StoreError::UsernameTaken(_)) => Err(PipelineError::Validation(vec![
            FieldError::at(&["username"], "Username already taken"),
        ])),
        Err(e) => Err(e.into()),
    }
}

/// Transport-side checks: size limit, then the mime allowlist by content.
fn read_upload(path: &Path, max_size: u64) -> Result<Upload, PipelineError> {
    let size = std::fs::metadata(path).map_err(StoreError::from)?.len();
    if size > max_size {
        return Err(PipelineError::Validation(vec![FieldError::at(
            &["image"],
            format!("File too large: {size} bytes (max {max_size})"),
        )]));
    }
    let data = std::fs::read(path).map_err(StoreError::from)?;
    let sniffed = image::guess_format(&data)
        .ok()
        .and_then(|f| FileType::from_mime(f.to_mime_type()));
    if sniffed.is_none() {
        return Err(PipelineError::Validation(vec![FieldError::at(
            &["image"],
            "Invalid file type. Expected image/png or image/jpeg",
        )]));
    }
    // The extension stands in for the client's Content-Type
    let declared_mime = image::ImageFormat::from_path(path)
        .ok()
        .map(|f| f.to_mime_type().to_string());
    Ok(Upload {
        reported_size: Some(size),
        data,
        declared_mime,
    })
}

fn log_failure(err: &PipelineError, subject: &str) {
    if err.is_server_error() {
        tracing::error!(subject, error = %err, "request failed");
    } else {
        warn!(subject, error = %err, "request rejected");
    }
}
