use anyhow::Context;
use clap::Parser;
use lexicon_mobi::{Config, DocumentFilterConfig, EntryLayout, InflectionConfig, Pipeline};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "lexicon-mobi",
    version,
    author,
    about = "Convert EPUB dictionaries into Kindle dictionaries",
    long_about = "Convert an EPUB dictionary such as the Lexicon Urthus into a Kindle dictionary.\n\n\
    This tool extracts headwords and definitions from the EPUB, adds lookup forms \
    for inflected spellings, writes a Kindle source directory and packs it with \
    Amazon's kindlegen.\n\n\
    USAGE EXAMPLES:\n  \
      # Convert with kindlegen from PATH\n  \
      lexicon-mobi lexicon-urthus.epub\n\n  \
      # Only write the Kindle source directory\n  \
      lexicon-mobi lexicon-urthus.epub --out ./kindle --source-only\n\n  \
      # Definition-list layout, skipping front matter\n  \
      lexicon-mobi glossary.epub --layout definition-list --exclude '**/front*.xhtml'"
)]
struct Cli {
    /// EPUB dictionary to convert
    #[arg(value_name = "EPUB")]
    input: PathBuf,

    /// Output directory for the source directory and the .mobi
    #[arg(short, long, default_value = "out", value_name = "PATH")]
    out: PathBuf,

    /// Base name of the output (defaults to the EPUB file stem)
    #[arg(short, long, value_name = "NAME")]
    name: Option<String>,

    /// Dictionary title (defaults to the EPUB title)
    #[arg(long)]
    title: Option<String>,

    /// Dictionary author (defaults to the EPUB creators)
    #[arg(long)]
    author: Option<String>,

    /// Dictionary description
    #[arg(long)]
    description: Option<String>,

    /// Language of the headwords (defaults to the EPUB language)
    #[arg(long, value_name = "LANG")]
    in_lang: Option<String>,

    /// Language of the definitions (defaults to the headword language)
    #[arg(long, value_name = "LANG")]
    out_lang: Option<String>,

    /// Where headwords live in the EPUB markup
    #[arg(short, long, value_enum, default_value = "paragraph")]
    layout: CliLayout,

    /// CSS selector for entry blocks (paragraph layout)
    #[arg(long, default_value = "p", value_name = "SELECTOR")]
    entry_selector: String,

    /// CSS selector the headword must match (paragraph layout)
    #[arg(long, default_value = "b, strong", value_name = "SELECTOR")]
    headword_selector: String,

    /// Skip content documents matching this glob (can be used multiple times)
    #[arg(long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Read only content documents matching this glob (can be used multiple times)
    #[arg(long, value_name = "GLOB")]
    include: Vec<String>,

    /// Max entries per page
    #[arg(long, value_name = "N")]
    entries_per_page: Option<usize>,

    /// Approximate max bytes per page
    #[arg(long, value_name = "BYTES")]
    max_page_bytes: Option<usize>,

    /// Entry page filename pattern
    #[arg(long, default_value = "entries_{index:03}.{ext}")]
    page_pattern: String,

    /// Do not add lookup forms with diacritics removed
    #[arg(long)]
    no_fold: bool,

    /// Do not add English plurals
    #[arg(long)]
    no_plurals: bool,

    /// Do not add Latin and Greek plurals
    #[arg(long)]
    no_learned_plurals: bool,

    /// Do not add possessives
    #[arg(long)]
    no_possessives: bool,

    /// Mark inflections as exact matches
    #[arg(long)]
    exact: bool,

    /// Disable spell-check lookups for headwords
    #[arg(long)]
    no_spellcheck: bool,

    /// Cover image (defaults to the EPUB cover)
    #[arg(long, value_name = "FILE")]
    cover: Option<PathBuf>,

    /// Path to a custom Tera template for entry pages
    ///
    /// The template receives `ctx.entries`, `ctx.dictionary`,
    /// `ctx.page_index`, `ctx.total_pages`, `ctx.spellcheck` and `ctx.exact`.
    ///
    /// Example: lexicon-mobi book.epub --page-template ./page.tera
    #[arg(long, value_name = "FILE")]
    page_template: Option<PathBuf>,

    /// kindlegen binary (defaults to searching PATH)
    #[arg(long, env = "KINDLEGEN", value_name = "FILE")]
    kindlegen: Option<PathBuf>,

    /// Write the Kindle source directory without running kindlegen
    #[arg(long)]
    source_only: bool,

    /// Remove the source directory after packing
    #[arg(long, conflicts_with = "source_only")]
    discard_source: bool,

    /// Dry run (don't write files)
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files without keeping backups
    #[arg(long)]
    no_backup: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliLayout {
    /// One paragraph per entry opening with a bold headword
    Paragraph,
    /// <dl> lists of <dt> headwords and <dd> definitions
    DefinitionList,
}

impl Cli {
    fn entry_layout(&self) -> EntryLayout {
        match self.layout {
            CliLayout::DefinitionList => EntryLayout::DefinitionList,
            CliLayout::Paragraph => EntryLayout::Paragraph {
                entry_selector: self.entry_selector.clone(),
                headword_selector: self.headword_selector.clone(),
            },
        }
    }

    const fn inflection(&self) -> InflectionConfig {
        InflectionConfig {
            fold_diacritics: !self.no_fold,
            english_plurals: !self.no_plurals,
            learned_plurals: !self.no_learned_plurals,
            possessives: !self.no_possessives,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let layout = cli.entry_layout();
    let inflection = cli.inflection();

    let mut builder = Config::builder()
        .input(cli.input)
        .output_dir(cli.out)
        .page_pattern(cli.page_pattern)
        .layout(layout)
        .inflection(inflection)
        .document_filter(
            DocumentFilterConfig::new()
                .exclude(cli.exclude)
                .include_only(cli.include),
        )
        .exact_inflections(cli.exact)
        .spellcheck(!cli.no_spellcheck)
        .source_only(cli.source_only)
        .keep_source(!cli.discard_source)
        .dry_run(cli.dry_run)
        .backup_existing(!cli.no_backup);

    if let Some(name) = cli.name {
        builder = builder.output_name(name);
    }
    if let Some(title) = cli.title {
        builder = builder.title(title);
    }
    if let Some(author) = cli.author {
        builder = builder.author(author);
    }
    if let Some(description) = cli.description {
        builder = builder.description(description);
    }
    if let Some(lang) = cli.in_lang {
        builder = builder.in_language(lang);
    }
    if let Some(lang) = cli.out_lang {
        builder = builder.out_language(lang);
    }
    if let Some(entries) = cli.entries_per_page {
        builder = builder.entries_per_page(entries);
    }
    if let Some(bytes) = cli.max_page_bytes {
        builder = builder.max_page_bytes(bytes);
    }
    if let Some(cover) = cli.cover {
        builder = builder.cover_path(cover);
    }
    if let Some(template_path) = cli.page_template {
        builder = builder.page_template(template_path);
    }
    if let Some(kindlegen) = cli.kindlegen {
        builder = builder.kindlegen_path(kindlegen);
    }

    let config = builder.build().context("Failed to build configuration")?;
    let dry_run = config.dry_run;

    let stats = Pipeline::new(config)
        .context("Failed to create pipeline")?
        .run()
        .context("Conversion failed")?;

    if !dry_run {
        stats.print_summary();
    }

    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("lexicon_mobi=info"),
        1 => EnvFilter::new("lexicon_mobi=debug"),
        _ => EnvFilter::new("lexicon_mobi=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
