use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use scribe::build::{build_site, clean};
use scribe::config::{Config, CONFIG_FILE};
use scribe::post::{parse_keywords, Draft, Edit};
use scribe::util::{format_time, trunc};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "scribe", version)]
#[command(about = "Build a static blog from the posts in a blog.json project file")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the project file
    #[arg(short, long, default_value = CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Root directory for generated files
    #[arg(short, long, default_value = ".", global = true)]
    output: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the post pages, the index, the stats page, the feed, the sitemap
    /// and the other site-wide files
    Build,
    /// Remove all generated files, then build the whole site
    Static,
    /// Remove all generated files
    Clean,
    /// Sort the posts by creation time, newest first
    Sort,
    /// List all posts
    Ls,
    /// Create a new post
    New(NewArgs),
    /// Edit a post and mark it as edited
    Ed(EdArgs),
    /// Remove posts
    Rm(RmArgs),
}

#[derive(Args)]
struct NewArgs {
    /// The post title; the slug is derived from it
    #[arg(short, long)]
    title: String,

    /// A short description of the post
    #[arg(short, long, default_value = "")]
    description: String,

    /// Comma-separated keywords
    #[arg(short, long, default_value = "")]
    keywords: String,

    /// Markdown file with the post content, or `-` for stdin
    #[arg(long)]
    content: PathBuf,
}

#[derive(Args)]
struct EdArgs {
    /// Slug of the post to edit
    slug: String,

    /// A new title; the slug stays the same
    #[arg(short, long)]
    title: Option<String>,

    /// A new description
    #[arg(short, long)]
    description: Option<String>,

    /// New comma-separated keywords, replacing the old ones
    #[arg(short, long)]
    keywords: Option<String>,

    /// Markdown file with the new content, or `-` for stdin
    #[arg(long)]
    content: Option<PathBuf>,
}

#[derive(Args)]
struct RmArgs {
    /// Slugs of the posts to remove
    #[arg(required = true)]
    slugs: Vec<String>,
}

fn run_build(config: &Config, project: &Path, output: &Path) -> Result<()> {
    let outcome = build_site(config, project, output)?;
    info!(
        posts = outcome.stats.posts,
        words = outcome.stats.words,
        "site is ready"
    );
    Ok(())
}

fn run_static(config: &Config, project: &Path, output: &Path) -> Result<()> {
    let start = Instant::now();
    clean(config, output)?;
    run_build(config, project, output)?;
    info!(elapsed = ?start.elapsed(), "static site built");
    Ok(())
}

fn run_ls(config: &Config) {
    for post in config.posts.iter() {
        let keywords: Vec<&str> = post.keywords.iter().map(String::as_str).collect();
        println!("post({})\n", post.slug);
        println!("title : {:?}", post.title);
        println!("description : {:?}", post.description);
        println!(
            "content : {:?}",
            trunc(&post.content, config.post_preview_size, " ...")
        );
        println!("keywords : {}", keywords.join(", "));
        println!("created : {} GMT", format_time(&post.created));
        if let Some(edited) = &post.edited {
            println!("edited : {} GMT", format_time(edited));
        }
        println!();
    }
}

fn read_content(path: &Path) -> Result<String> {
    match path.as_os_str() == "-" {
        true => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("reading post content from stdin")?;
            Ok(content)
        }
        false => std::fs::read_to_string(path)
            .with_context(|| format!("reading post content `{}`", path.display())),
    }
}

fn run_new(mut config: Config, path: &Path, args: NewArgs) -> Result<()> {
    let content = read_content(&args.content)?;

    let settings = config.pipeline();
    let slug = config
        .posts
        .add(
            Draft {
                title: args.title,
                description: args.description,
                content,
                keywords: parse_keywords(&args.keywords),
            },
            Utc::now(),
            &settings,
        )?
        .slug
        .clone();
    config.posts.sort();
    config.save(path)?;
    info!(%slug, "saved new post");
    Ok(())
}

fn run_ed(mut config: Config, path: &Path, args: EdArgs) -> Result<()> {
    let edit = Edit {
        title: args.title,
        description: args.description,
        content: args.content.as_deref().map(read_content).transpose()?,
        keywords: args.keywords.as_deref().map(parse_keywords),
    };
    config.posts.edit(&args.slug, edit, Utc::now())?;
    config.save(path)?;
    info!(slug = %args.slug, "edited post");
    Ok(())
}

fn run_rm(mut config: Config, path: &Path, args: RmArgs) -> Result<()> {
    for slug in &args.slugs {
        config.posts.remove(slug)?;
        info!(%slug, "removed post");
    }
    config.save(path)?;
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    match cli.command {
        Commands::Build => run_build(&config, &cli.config, &cli.output),
        Commands::Static => run_static(&config, &cli.config, &cli.output),
        Commands::Clean => Ok(clean(&config, &cli.output)?),
        Commands::Sort => {
            // `Config::load` already sorted the corpus.
            config.save(&cli.config)?;
            info!(posts = config.posts.len(), "sorted posts by creation time");
            Ok(())
        }
        Commands::Ls => {
            run_ls(&config);
            Ok(())
        }
        Commands::New(args) => run_new(config, &cli.config, args),
        Commands::Ed(args) => run_ed(config, &cli.config, args),
        Commands::Rm(args) => run_rm(config, &cli.config, args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // `RUST_LOG` overrides the level picked by `-v`.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error: setting tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
