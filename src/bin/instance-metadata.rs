//! CLI binary for the instance-metadata crate.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use instance_metadata::write::{
    DictWriter, InterpreterWriter, JsonWriter, MetadataWriter, RawWriter, ShellWriter, TreeWriter,
};
use instance_metadata::{
    CertConfig, DefaultPolicy, DriveConfig, FileConfig, HttpConfig, LeafPolicy, MetadataError,
    MetadataFormatter, MetadataProvider, SelectiveSource, Source, SourceKind, SourceSpec,
    TreeClimber,
};

/// Default prefix applied to flattened keys.
const DEFAULT_PREFIX: &str = "RS_";

#[derive(Parser)]
#[command(name = "instance-metadata")]
#[command(
    author,
    version,
    about = "Acquire instance metadata from the platform and persist it for later boot stages"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Climb the metadata namespace and persist or print the result
    Fetch {
        /// Backends to chain, in priority order
        #[arg(short, long, value_delimiter = ',', default_value = "http")]
        backend: Vec<SourceKind>,

        /// Metadata service host (http backend)
        #[arg(long, default_value = "169.254.169.254")]
        host: String,

        /// Metadata service port (http backend)
        #[arg(long, default_value_t = 80)]
        port: u16,

        /// Injected cloud-metadata file (file backend)
        #[arg(long)]
        metadata_file: Option<PathBuf>,

        /// Injected user-data file (file backend)
        #[arg(long)]
        userdata_file: Option<PathBuf>,

        /// Certificate store directory (cert-store backend)
        #[arg(long)]
        cert_store: Option<PathBuf>,

        /// Certificate issuer matched verbatim (cert-store backend)
        #[arg(long)]
        issuer: Option<String>,

        /// Root path of the cloud-metadata namespace
        #[arg(long, default_value = "latest/meta-data")]
        root: String,

        /// Root path of the user-data namespace; climbed as a single leaf
        #[arg(long)]
        user_root: Option<String>,

        /// Prefix applied to flattened keys
        #[arg(short, long, default_value = DEFAULT_PREFIX)]
        prefix: String,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,

        /// Output directory; omit to print to stdout instead
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Also mirror the raw tree under <out-dir>/raw for diagnostics
        #[arg(long)]
        raw_capture: bool,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    Dict,
    #[default]
    Json,
    Shell,
    Ruby,
    Tree,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dict" => Ok(OutputFormat::Dict),
            "json" => Ok(OutputFormat::Json),
            "shell" => Ok(OutputFormat::Shell),
            "ruby" => Ok(OutputFormat::Ruby),
            "tree" => Ok(OutputFormat::Tree),
            _ => Err(format!("unknown format: {}", s)),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(cli: Cli) -> Result<(), MetadataError> {
    match cli.command {
        Commands::Fetch {
            backend,
            host,
            port,
            metadata_file,
            userdata_file,
            cert_store,
            issuer,
            root,
            user_root,
            prefix,
            format,
            out_dir,
            raw_capture,
        } => {
            let mut chain = SelectiveSource::new();
            for kind in backend {
                chain.push_spec(spec_for(
                    kind,
                    &host,
                    port,
                    &metadata_file,
                    &userdata_file,
                    &cert_store,
                    &issuer,
                ));
            }
            let source = Arc::new(chain);

            let provider = MetadataProvider::new(
                source.clone(),
                TreeClimber::new(Box::new(DefaultPolicy)),
                &root,
            );
            let provider = match (&out_dir, raw_capture) {
                (Some(dir), true) => {
                    provider.with_raw_capture(TreeWriter::new(dir.join("raw"), "metadata"))
                }
                _ => provider,
            };

            let tree = provider.build_metadata().await?;
            let flat = MetadataFormatter::new(&prefix).format_node(&tree);

            match &out_dir {
                Some(dir) => {
                    let path = match format {
                        OutputFormat::Dict => DictWriter::new(dir, "metadata").write(&flat)?,
                        OutputFormat::Json => JsonWriter::new(dir, "metadata").write(&flat)?,
                        OutputFormat::Shell => ShellWriter::new(dir, "metadata").write(&flat)?,
                        OutputFormat::Ruby => {
                            InterpreterWriter::new(dir, "metadata", "ruby", "rb").write(&flat)?
                        }
                        OutputFormat::Tree => TreeWriter::new(dir, "metadata").write_node(&tree)?,
                    };
                    tracing::info!(path = %path.display(), "metadata written");
                }
                None => {
                    println!("{}", serde_json::to_string_pretty(&flat)?);
                }
            }

            if let Some(user_root) = user_root {
                let user_provider = MetadataProvider::new(
                    source.clone(),
                    TreeClimber::new(Box::new(LeafPolicy)),
                    &user_root,
                );
                let user_tree = user_provider.build_metadata().await?;
                if let instance_metadata::MetadataNode::Leaf(blob) = &user_tree {
                    match &out_dir {
                        Some(dir) => {
                            let path = RawWriter::new(dir, "userdata").write_raw(blob.as_bytes())?;
                            tracing::info!(path = %path.display(), "user data written");
                        }
                        None => print!("{}", blob),
                    }
                }
            }

            source.finish().await;
            Ok(())
        }
    }
}

fn spec_for(
    kind: SourceKind,
    host: &str,
    port: u16,
    metadata_file: &Option<PathBuf>,
    userdata_file: &Option<PathBuf>,
    cert_store: &Option<PathBuf>,
    issuer: &Option<String>,
) -> SourceSpec {
    match kind {
        SourceKind::Http => SourceSpec::Http(HttpConfig {
            hosts: vec![host.to_string()],
            port,
            ..HttpConfig::default()
        }),
        SourceKind::File => {
            let mut config = FileConfig::default();
            if let Some(path) = metadata_file {
                config.metadata_path = path.clone();
            }
            if let Some(path) = userdata_file {
                config.userdata_path = Some(path.clone());
            }
            SourceSpec::File(config)
        }
        SourceKind::CertStore => SourceSpec::CertStore(CertConfig {
            store_dir: cert_store.clone().unwrap_or_default(),
            issuer: issuer.clone(),
        }),
        SourceKind::BlockDevice => SourceSpec::BlockDevice(DriveConfig::default()),
    }
}
