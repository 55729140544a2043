mod apply;
mod device;
mod logging;
mod options;

use std::path::{Path, PathBuf};
use std::process::exit;

use anyhow::{Context, Result};
use clap::{CommandFactory as _, Parser, Subcommand};
use options::Options;

fn main() {
    let args = Args::parse();
    handle_result(run_args(args));
}

fn run_args(args: Args) -> Result<()> {
    let mut frontend = logging::set_up(logging::Options {
        verbose: args.options.verbose,
        color: args.options.use_color(),
    })?;
    let r = match &args.command {
        Commands::Apply(subargs) => apply::apply(&args.options, subargs),
        Commands::Types => {
            for object_type in alteon_configurators::object_types() {
                println!("{}", object_type);
            }
            Ok(())
        }
        Commands::Catalog { object_type } => catalog(object_type),
        Commands::InitDevice { path } => init_device(path),
        Commands::GenerateMan => (|| {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        })(),
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "alteon-apply", &mut std::io::stdout());
            Ok(())
        }
    };
    frontend.tear_down()?;
    r
}

fn catalog(object_type: &str) -> Result<()> {
    let catalog = alteon_configurators::catalog(object_type).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown object type {}, see `alteon-apply types`",
            object_type
        )
    })?;
    println!("{}", serde_json::to_string_pretty(catalog)?);
    Ok(())
}

fn init_device(path: &Path) -> Result<()> {
    alteon_device_local::LocalDevice::create(path)
        .with_context(|| format!("creating device journal {}", path.display()))?;
    tracing::info!(path = %path.display(), "created local device");
    Ok(())
}

fn handle_result(r: Result<()>) {
    match r {
        Ok(()) => {}
        Err(e) => {
            eprintln!("alteon-apply error: {:?}", e);
            exit(1);
        }
    }
}

/// Alteon: reconcile device configuration objects with their desired state
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring one object into the desired state, or read it
    #[command()]
    Apply(apply::Args),

    /// List the supported object types
    Types,

    /// Print the fields and collections of an object type as JSON
    Catalog {
        #[arg(long("type"))]
        object_type: String,
    },

    /// Create an empty local device journal
    InitDevice {
        /// Where to create the journal; the file must not exist
        #[arg(long)]
        path: PathBuf,
    },

    /// Generate markdown documentation for alteon-apply
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for alteon-apply
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for alteon-apply
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_catalog() {
        let args = Args::try_parse_from(["alteon-apply", "catalog", "--type", "l7_content_class"]).unwrap();
        assert!(
            matches!(args.command, Commands::Catalog { ref object_type } if object_type == "l7_content_class")
        );
        assert!(!args.options.verbose);
    }

    #[test]
    fn test_unknown_catalog() {
        assert!(catalog("virt").is_err());
    }
}
