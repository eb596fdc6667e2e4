use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use halal_contracts::catalog::CategorySelection;
use halal_contracts::chat::{parse_intent, Intent, SHELL_HELP_COMMANDS};
use halal_contracts::events::EventWriter;
use halal_contracts::i18n::{Language, UiStrings};
use halal_contracts::products::{Product, CATEGORIES};
use halal_contracts::store::{JsonFileStore, MemoryStore, PersistencePort};
use halal_engine::assistant::Role;
use halal_engine::lookup::{prepare_scan_image, LookupOutcome, DEFAULT_SCAN_MAX_DIM};
use halal_engine::oracle::{OracleConfig, OracleRegistry};
use halal_engine::{new_session_id, HalalEngine};

#[derive(Debug, Parser)]
#[command(name = "halal", version, about = "Halal product guide")]
struct Cli {
    /// State file holding the catalog, favorites and language.
    #[arg(
        long,
        global = true,
        env = "HALAL_STATE_PATH",
        default_value = ".halal/state.json"
    )]
    state: PathBuf,
    /// Event log (defaults to events.jsonl beside the state file).
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[arg(long, global = true)]
    model: Option<String>,
    /// Keep state in memory only.
    #[arg(long, global = true)]
    ephemeral: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    List(ListArgs),
    Show(IdArgs),
    Search(TextArgs),
    Scan(ScanArgs),
    Fav(IdArgs),
    Lang(LangArgs),
    Ask(TextArgs),
    Shell,
}

#[derive(Debug, Parser)]
struct ListArgs {
    #[arg(long, default_value = "all")]
    category: String,
    #[arg(long, default_value = "")]
    filter: String,
}

#[derive(Debug, Parser)]
struct IdArgs {
    id: String,
}

#[derive(Debug, Parser)]
struct TextArgs {
    #[arg(required = true, num_args = 1..)]
    text: Vec<String>,
}

#[derive(Debug, Parser)]
struct ScanArgs {
    image: PathBuf,
    #[arg(long, default_value_t = DEFAULT_SCAN_MAX_DIM)]
    max_dim: u32,
}

#[derive(Debug, Parser)]
struct LangArgs {
    code: String,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("halal error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let session_id = new_session_id();
    let events = match (cli.events.as_ref(), cli.ephemeral) {
        (Some(path), _) => EventWriter::new(path, session_id),
        (None, true) => EventWriter::disabled(session_id),
        (None, false) => EventWriter::new(default_events_path(&cli.state), session_id),
    };
    let oracles = OracleRegistry::with_defaults(OracleConfig::from_env());
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.ephemeral {
        let engine = HalalEngine::new(MemoryStore::new(), events, oracles, cli.model);
        dispatch(engine, cli.command, &mut out)
    } else {
        let engine = HalalEngine::new(JsonFileStore::new(&cli.state), events, oracles, cli.model);
        dispatch(engine, cli.command, &mut out)
    }
}

fn default_events_path(state: &Path) -> PathBuf {
    state
        .parent()
        .map(|parent| parent.join("events.jsonl"))
        .unwrap_or_else(|| PathBuf::from("events.jsonl"))
}

fn dispatch<P: PersistencePort>(
    mut engine: HalalEngine<P>,
    command: Command,
    out: &mut impl Write,
) -> Result<i32> {
    match command {
        Command::List(args) => {
            let selection = CategorySelection::parse(&args.category);
            write_list(&engine, &selection, &args.filter, out)?;
            Ok(0)
        }
        Command::Show(args) => {
            let id = resolve_product_id(&engine, &args.id)
                .with_context(|| format!("no product matches '{}'", args.id.trim()))?;
            write_detail(&engine, &id, out)?;
            Ok(0)
        }
        Command::Search(args) => run_search(&mut engine, &args.text.join(" "), out),
        Command::Scan(args) => run_scan(&mut engine, &args.image, args.max_dim, out),
        Command::Fav(args) => {
            run_toggle_favorite(&mut engine, &args.id, out)?;
            Ok(0)
        }
        Command::Lang(args) => {
            let language = args
                .code
                .parse::<Language>()
                .map_err(anyhow::Error::msg)?;
            run_set_language(&mut engine, language, out)?;
            Ok(0)
        }
        Command::Ask(args) => run_ask(&mut engine, &args.text.join(" "), out),
        Command::Shell => {
            let stdin = io::stdin();
            run_shell(&mut engine, stdin.lock(), out)?;
            Ok(0)
        }
    }
}

fn run_search<P: PersistencePort>(
    engine: &mut HalalEngine<P>,
    query: &str,
    out: &mut impl Write,
) -> Result<i32> {
    writeln!(out, "{}", engine.strings().analyzing)?;
    let outcome = engine.search(query)?;
    write_fallback_note(engine, out)?;
    write_outcome(engine, &outcome, out)
}

fn run_scan<P: PersistencePort>(
    engine: &mut HalalEngine<P>,
    path: &Path,
    max_dim: u32,
    out: &mut impl Write,
) -> Result<i32> {
    let bytes = prepare_scan_image(path, max_dim)?;
    writeln!(out, "{}", engine.strings().analyzing)?;
    let outcome = engine.scan(&bytes)?;
    write_fallback_note(engine, out)?;
    write_outcome(engine, &outcome, out)
}

fn write_fallback_note<P: PersistencePort>(
    engine: &HalalEngine<P>,
    out: &mut impl Write,
) -> Result<()> {
    if let Some(reason) = engine.last_fallback_reason() {
        writeln!(out, "note: {reason}")?;
    }
    Ok(())
}

fn write_outcome<P: PersistencePort>(
    engine: &HalalEngine<P>,
    outcome: &LookupOutcome,
    out: &mut impl Write,
) -> Result<i32> {
    match outcome {
        LookupOutcome::Found(product) => {
            write_detail(engine, &product.id, out)?;
            Ok(0)
        }
        LookupOutcome::Failed { message, reason } => {
            writeln!(out, "{message}")?;
            writeln!(out, "  ({reason})")?;
            Ok(1)
        }
        LookupOutcome::Ignored => {
            writeln!(out, "Nothing to look up.")?;
            Ok(1)
        }
    }
}

fn run_toggle_favorite<P: PersistencePort>(
    engine: &mut HalalEngine<P>,
    raw_id: &str,
    out: &mut impl Write,
) -> Result<()> {
    let id = resolve_product_id(engine, raw_id).unwrap_or_else(|| raw_id.trim().to_string());
    if id.is_empty() {
        bail!("a product id is required");
    }
    let favorite = engine.toggle_favorite(&id);
    let label = engine
        .catalog()
        .get(&id)
        .map(|product| product.name.clone())
        .unwrap_or_else(|| id.clone());
    if favorite {
        writeln!(out, "♥ {label} added to favorites")?;
    } else {
        writeln!(out, "♡ {label} removed from favorites")?;
    }
    Ok(())
}

fn run_set_language<P: PersistencePort>(
    engine: &mut HalalEngine<P>,
    language: Language,
    out: &mut impl Write,
) -> Result<()> {
    if !engine.set_language(language) {
        writeln!(out, "Language is already {language}")?;
        return Ok(());
    }
    let strings = engine.strings();
    writeln!(out, "Language set to {language}")?;
    writeln!(out, "{} · {}", strings.app_name, strings.tagline)?;
    Ok(())
}

fn run_ask<P: PersistencePort>(
    engine: &mut HalalEngine<P>,
    text: &str,
    out: &mut impl Write,
) -> Result<i32> {
    writeln!(out, "{}", engine.assistant().thinking_label())?;
    let reply = engine.ask(text)?;
    write_fallback_note(engine, out)?;
    match reply {
        Some(message) => {
            writeln!(out, "{}", message.text)?;
            Ok(0)
        }
        None => {
            writeln!(out, "Nothing to ask.")?;
            Ok(1)
        }
    }
}

#[derive(Debug, Default)]
struct ShellState {
    selection: CategorySelection,
    filter: String,
}

fn run_shell<P: PersistencePort>(
    engine: &mut HalalEngine<P>,
    mut input: impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    let mut state = ShellState::default();
    let strings = engine.strings();
    writeln!(out, "{} · {}", strings.app_name, strings.tagline)?;
    writeln!(out, "{}", strings.database(engine.catalog().len()))?;
    if let Some(path) = engine.events().path() {
        writeln!(out, "Events: {}", path.display())?;
    }
    writeln!(out, "Type a product name to look it up, or /help for commands.")?;

    let mut line = String::new();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match handle_shell_intent(engine, &mut state, &intent, out) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => writeln!(out, "error: {err:#}")?,
        }
    }
    Ok(())
}

/// Returns `false` when the shell should exit.
fn handle_shell_intent<P: PersistencePort>(
    engine: &mut HalalEngine<P>,
    state: &mut ShellState,
    intent: &Intent,
    out: &mut impl Write,
) -> Result<bool> {
    match intent.action.as_str() {
        "noop" => {}
        "quit" => return Ok(false),
        "help" => {
            writeln!(out, "Commands: {}", SHELL_HELP_COMMANDS.join(" "))?;
            writeln!(out, "Plain text runs a lookup.")?;
        }
        "lookup" => {
            let query = non_empty_arg(intent, "query").unwrap_or_default();
            run_search(engine, &query, out)?;
        }
        "scan" => {
            let Some(path) = non_empty_arg(intent, "path") else {
                writeln!(out, "/scan requires an image path")?;
                return Ok(true);
            };
            run_scan(engine, Path::new(&path), DEFAULT_SCAN_MAX_DIM, out)?;
        }
        "set_filter" => {
            state.filter = non_empty_arg(intent, "text").unwrap_or_default();
            write_list(engine, &state.selection, &state.filter, out)?;
        }
        "set_category" => {
            state.selection =
                CategorySelection::parse(&non_empty_arg(intent, "category").unwrap_or_default());
            write_list(engine, &state.selection, &state.filter, out)?;
        }
        "show_favorites" => {
            state.selection = CategorySelection::Favorites;
            write_list(engine, &state.selection, &state.filter, out)?;
        }
        "list" => {
            engine.clear_focus();
            write_list(engine, &state.selection, &state.filter, out)?;
        }
        "toggle_favorite" => match non_empty_arg(intent, "id") {
            Some(id) => run_toggle_favorite(engine, &id, out)?,
            None => writeln!(out, "/fav requires a product id")?,
        },
        "show" => {
            let requested = non_empty_arg(intent, "id");
            let id = match requested.as_deref() {
                Some(raw) => resolve_product_id(engine, raw),
                None => engine.lookup().focused().map(|product| product.id.clone()),
            };
            match id {
                Some(id) => write_detail(engine, &id, out)?,
                None => writeln!(out, "{}", engine.strings().no_results)?,
            }
        }
        "set_language" => {
            let Some(code) = non_empty_arg(intent, "language") else {
                let codes = Language::ALL.map(Language::code).join(", ");
                writeln!(out, "Language: {} (available: {codes})", engine.language())?;
                return Ok(true);
            };
            let language = code.parse::<Language>().map_err(anyhow::Error::msg)?;
            run_set_language(engine, language, out)?;
        }
        "ask" => {
            let message = non_empty_arg(intent, "message").unwrap_or_default();
            run_ask(engine, &message, out)?;
        }
        "history" => {
            for message in engine.assistant().transcript() {
                let speaker = match message.role {
                    Role::User => "you",
                    Role::Assistant => "assistant",
                };
                writeln!(out, "[{speaker}] {}", message.text)?;
            }
        }
        "set_model" => match non_empty_arg(intent, "model") {
            Some(name) => {
                let spec = engine.set_model(&name)?;
                writeln!(out, "Model set to {} ({})", spec.name, spec.provider)?;
            }
            None => {
                let current = engine.requested_model().unwrap_or("default");
                writeln!(out, "Model: {current}")?;
                for model in engine.models() {
                    writeln!(
                        out,
                        "  {} [{}] {}",
                        model.name,
                        model.provider,
                        model.capabilities.join(",")
                    )?;
                }
            }
        },
        _ => {
            let command = non_empty_arg(intent, "command").unwrap_or_default();
            writeln!(out, "Unknown command /{command}. Type /help.")?;
        }
    }
    Ok(true)
}

fn non_empty_arg(intent: &Intent, key: &str) -> Option<String> {
    let raw = intent.arg(key).map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn resolve_product_id<P: PersistencePort>(engine: &HalalEngine<P>, raw: &str) -> Option<String> {
    engine.catalog().resolve_id(raw).map(str::to_string)
}

fn write_list<P: PersistencePort>(
    engine: &HalalEngine<P>,
    selection: &CategorySelection,
    filter: &str,
    out: &mut impl Write,
) -> Result<()> {
    let strings = engine.strings();
    writeln!(out, "{}", category_bar(strings, selection))?;
    let view = engine.filtered_view(selection, filter);
    if view.is_empty() {
        writeln!(out, "{}", strings.no_results)?;
        return Ok(());
    }
    for product in view {
        let favorite = engine.catalog().is_favorite(&product.id);
        writeln!(out, "{}", render_card(product, strings, favorite))?;
    }
    Ok(())
}

fn write_detail<P: PersistencePort>(
    engine: &HalalEngine<P>,
    id: &str,
    out: &mut impl Write,
) -> Result<()> {
    let Some(product) = engine.catalog().get(id) else {
        bail!("no product with id '{id}'");
    };
    let favorite = engine.catalog().is_favorite(id);
    write!(out, "{}", render_detail(product, engine.strings(), favorite))?;
    Ok(())
}

fn category_bar(strings: &UiStrings, selection: &CategorySelection) -> String {
    CATEGORIES
        .iter()
        .map(|spec| {
            let label = format!("{} {}", spec.icon, strings.category_label(spec.id));
            if spec.id == selection.id() {
                format!("[{label}]")
            } else {
                label
            }
        })
        .collect::<Vec<String>>()
        .join("  ")
}

fn render_card(product: &Product, strings: &UiStrings, favorite: bool) -> String {
    let mut line = format!(
        "{} [{}] {} · {}",
        if favorite { "♥" } else { " " },
        strings.status_label(product.status),
        product.name,
        product.brand
    );
    if let Some(flavor) = product.flavor.as_deref() {
        line.push_str(&format!(" ({flavor})"));
    }
    line.push_str(&format!(
        "  {}  id={}",
        strings.category_label(&product.category),
        product.id
    ));
    if product.is_boycotted {
        line.push_str("  ⚠ boycott");
    }
    line
}

fn render_detail(product: &Product, strings: &UiStrings, favorite: bool) -> String {
    let mut text = String::new();
    text.push_str(&format!(
        "{}{}\n",
        product.name,
        if favorite { " ♥" } else { "" }
    ));
    text.push_str(&format!("  brand:      {}\n", product.brand));
    if let Some(flavor) = product.flavor.as_deref() {
        text.push_str(&format!("  flavor:     {flavor}\n"));
    }
    text.push_str(&format!(
        "  status:     {} ({})\n",
        strings.status_label(product.status),
        product.status
    ));
    text.push_str(&format!(
        "  category:   {}\n",
        strings.category_label(&product.category)
    ));
    if product.is_boycotted {
        let reason = product
            .boycott_reason
            .as_deref()
            .unwrap_or("listed for boycott");
        text.push_str(&format!("  ⚠ boycott:  {reason}\n"));
    }
    if !product.ingredients.is_empty() {
        text.push_str(&format!(
            "  ingredients: {}\n",
            product.ingredients.join(", ")
        ));
    }
    text.push_str(&format!("  {}\n", product.explanation));
    if let Some(reference) = product.religious_reference.as_deref() {
        text.push_str(&format!("  reference:  {reference}\n"));
    }
    text.push_str(&format!("  image:      {}\n", image_reference(&product.image_url)));
    text.push_str(&format!("  id:         {}\n", product.id));
    text
}

fn image_reference(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("data:") {
        let mime = rest.split([';', ',']).next().unwrap_or_default();
        return format!("inline {mime} ({} chars)", url.len());
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use clap::Parser;
    use halal_contracts::products::{seed_products, DietaryStatus};
    use halal_contracts::store::{MemoryStore, FAVORITES_KEY, LANGUAGE_KEY};
    use serde_json::json;

    use super::*;

    fn dryrun_engine() -> HalalEngine<MemoryStore> {
        HalalEngine::new(
            MemoryStore::new(),
            EventWriter::disabled("test"),
            OracleRegistry::with_defaults(OracleConfig::default()),
            Some("dryrun-oracle-1".to_string()),
        )
    }

    fn shell_transcript(engine: &mut HalalEngine<MemoryStore>, script: &str) -> Result<String> {
        let mut out = Vec::new();
        run_shell(engine, Cursor::new(script.to_string()), &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    fn sample_product() -> Product {
        Product {
            id: "p1".to_string(),
            name: "Cola".to_string(),
            brand: "Fizz".to_string(),
            flavor: Some("Cherry".to_string()),
            status: DietaryStatus::Mushbooh,
            category: "drinks".to_string(),
            image_url: "data:image/jpeg;base64,AAAA".to_string(),
            ingredients: vec!["water".to_string(), "natural flavors".to_string()],
            explanation: "Flavor carrier may contain alcohol.".to_string(),
            religious_reference: None,
            is_boycotted: true,
            boycott_reason: Some("Parent company on the boycott list".to_string()),
        }
    }

    #[test]
    fn cli_parses_global_options_after_subcommand() -> Result<()> {
        let cli = Cli::try_parse_from([
            "halal",
            "search",
            "Kinder",
            "Bueno",
            "--model",
            "dryrun-oracle-1",
            "--ephemeral",
        ])?;
        assert!(cli.ephemeral);
        assert_eq!(cli.model.as_deref(), Some("dryrun-oracle-1"));
        let Command::Search(args) = cli.command else {
            bail!("expected search");
        };
        assert_eq!(args.text.join(" "), "Kinder Bueno");
        Ok(())
    }

    #[test]
    fn search_requires_text() {
        assert!(Cli::try_parse_from(["halal", "search"]).is_err());
    }

    #[test]
    fn events_default_beside_state_file() {
        assert_eq!(
            default_events_path(Path::new(".halal/state.json")),
            PathBuf::from(".halal/events.jsonl")
        );
        assert_eq!(
            default_events_path(Path::new("state.json")),
            PathBuf::from("events.jsonl")
        );
    }

    #[test]
    fn card_uses_localized_labels_and_marks_boycott() {
        let card = render_card(&sample_product(), Language::En.strings(), true);
        assert!(card.starts_with("♥ [DOUBTFUL] Cola · Fizz (Cherry)"));
        assert!(card.contains("Drinks"));
        assert!(card.contains("⚠ boycott"));

        let ru = render_card(&sample_product(), Language::Ru.strings(), false);
        assert!(ru.contains("[СОМНИТЕЛЬНО]"));
        assert!(ru.contains("Напитки"));
    }

    #[test]
    fn detail_shows_advisory_and_hides_inline_image_data() {
        let detail = render_detail(&sample_product(), Language::En.strings(), false);
        assert!(detail.contains("⚠ boycott:  Parent company on the boycott list"));
        assert!(detail.contains("ingredients: water, natural flavors"));
        assert!(detail.contains("image:      inline image/jpeg"));
        assert!(!detail.contains("AAAA"));
    }

    #[test]
    fn shell_lookup_merges_and_shows_product() -> Result<()> {
        let mut engine = dryrun_engine();
        let transcript = shell_transcript(&mut engine, "Haribo Goldbears\n/quit\nignored\n")?;
        assert_eq!(engine.catalog().len(), seed_products().len() + 1);
        assert_eq!(engine.catalog().products()[0].name, "Haribo Goldbears");
        assert!(transcript.contains("Haribo Goldbears"));
        assert!(transcript.contains("СОМНИТЕЛЬНО"));
        Ok(())
    }

    #[test]
    fn shell_favorites_and_language_persist() -> Result<()> {
        let mut engine = dryrun_engine();
        let transcript = shell_transcript(&mut engine, "/fav e47\n/favs\n/lang en\n/history\n")?;
        assert!(transcript.contains("added to favorites"));
        assert!(engine.catalog().is_favorite("e471"));
        assert_eq!(engine.port().slot(FAVORITES_KEY), Some(&json!(["e471"])));
        assert_eq!(engine.port().slot(LANGUAGE_KEY), Some(&json!("en")));
        assert!(transcript.contains(Language::En.assistant_greeting()));
        Ok(())
    }

    #[test]
    fn shell_reports_errors_and_keeps_running() -> Result<()> {
        let mut engine = dryrun_engine();
        let transcript = shell_transcript(
            &mut engine,
            "/lang de\n/model gpt-9\n/frobnicate\n/list\n",
        )?;
        assert!(transcript.contains("error: unknown language 'de'"));
        assert!(transcript.contains("error: unknown model 'gpt-9'"));
        assert!(transcript.contains("Unknown command /frobnicate"));
        assert!(transcript.contains("E471"));
        Ok(())
    }

    #[test]
    fn shell_ask_uses_assistant_session() -> Result<()> {
        let mut engine = dryrun_engine();
        let transcript = shell_transcript(&mut engine, "/ask Is E120 halal?\n")?;
        assert!(transcript.contains("You asked: Is E120 halal?"));
        assert_eq!(engine.assistant().transcript().len(), 3);
        Ok(())
    }

    #[test]
    fn show_command_resolves_prefix() -> Result<()> {
        let engine = dryrun_engine();
        let mut out = Vec::new();
        let code = dispatch(
            engine,
            Command::Show(IdArgs {
                id: "gummy".to_string(),
            }),
            &mut out,
        )?;
        assert_eq!(code, 0);
        assert!(String::from_utf8(out)?.contains("id:         gummy-bears"));
        Ok(())
    }

    #[test]
    fn failed_lookup_exits_with_one() -> Result<()> {
        let engine = HalalEngine::new(
            MemoryStore::new(),
            EventWriter::disabled("test"),
            OracleRegistry::with_defaults(OracleConfig::default()),
            Some("gemini-2.5-flash".to_string()),
        );
        let mut out = Vec::new();
        let code = dispatch(
            engine,
            Command::Search(TextArgs {
                text: vec!["Cola".to_string()],
            }),
            &mut out,
        )?;
        assert_eq!(code, 1);
        assert!(String::from_utf8(out)?.contains(Language::Ru.strings().error_msg));
        Ok(())
    }
}
