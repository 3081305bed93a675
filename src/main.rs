use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rbrowse::client::{RecipeClient, RecipeSummary, open_default_client};
use rbrowse::config::Config;
use rbrowse::error::{AppError, AppResult};
use rbrowse::session::{JsonFileStore, MemoryStore, StateStore};
use rbrowse::{
    DetailEvent, FoodCategory, Notice, RecipeDetailController, SearchPaginationController,
};

#[derive(Debug, Parser)]
#[command(name = "rbrowse", version, about = "Browse recipes from the terminal")]
struct Cli {
    /// Config file to load instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON file holding the restorable session.
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search recipes, optionally fetching more than one page.
    Search {
        query: Option<String>,

        #[arg(long, short, conflicts_with = "query")]
        category: Option<String>,

        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        pages: u32,
    },
    /// List the browsable food categories.
    Categories,
    /// Show one recipe.
    Recipe { id: u64 },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    if let Err(err) = run(Cli::parse()).await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    rbrowse::logging::init_tracing(&config.log.level)?;

    match cli.command {
        Command::Categories => print_categories(cli.json),
        Command::Search {
            query,
            category,
            pages,
        } => {
            let client = open_default_client(&config.api)?;
            let store = open_store(cli.state.as_ref(), &config)?;
            search(client, &config, store, query, category, pages, cli.json).await
        }
        Command::Recipe { id } => {
            let client = open_default_client(&config.api)?;
            let store = open_store(cli.state.as_ref(), &config)?;
            show_recipe(client, &config, store, id, cli.json).await
        }
    }
}

async fn search(
    client: Arc<dyn RecipeClient>,
    config: &Config,
    store: Box<dyn StateStore>,
    query: Option<String>,
    category: Option<String>,
    pages: u32,
    json: bool,
) -> AppResult<()> {
    // Construction may start restoring the previous session; the new search
    // below supersedes it.
    let mut controller = SearchPaginationController::new(client, api_token(config), config, store)?;

    match (category, query) {
        (Some(category), _) => controller.select_category(Some(&category))?,
        (None, Some(query)) => controller.set_query(query),
        (None, None) => {}
    }
    controller.trigger_new_search();
    controller.settle().await;

    while controller.view().page < pages && controller.view().notice.is_none() {
        let before = controller.view().recipes.len();
        controller.trigger_next_page();
        controller.settle().await;
        if controller.view().recipes.len() == before {
            break;
        }
    }

    let view = controller.view();
    if let Some(notice) = &view.notice {
        return Err(notice_error(notice));
    }
    print_summaries(&view.recipes, json)
}

async fn show_recipe(
    client: Arc<dyn RecipeClient>,
    config: &Config,
    store: Box<dyn StateStore>,
    id: u64,
    json: bool,
) -> AppResult<()> {
    let mut controller = RecipeDetailController::new(client, api_token(config), config, store)?;
    controller.on_trigger_event(DetailEvent::Load(id));
    controller.settle().await;

    let view = controller.view();
    if let Some(notice) = &view.notice {
        return Err(notice_error(notice));
    }
    let Some(recipe) = &view.recipe else {
        return Err(AppError::internal(format!("recipe {id} was not loaded")));
    };

    if json {
        println!("{}", to_json(recipe)?);
        return Ok(());
    }
    println!("{} (#{})", recipe.title, recipe.id);
    println!("by {} | rating {}", recipe.publisher, recipe.rating);
    if !recipe.source_url.is_empty() {
        println!("{}", recipe.source_url);
    }
    if !recipe.ingredients.is_empty() {
        println!();
        for ingredient in &recipe.ingredients {
            println!("- {ingredient}");
        }
    }
    if let Some(instructions) = &recipe.cooking_instructions {
        println!();
        println!("{instructions}");
    }
    Ok(())
}

fn print_categories(json: bool) -> AppResult<()> {
    if json {
        let values: Vec<&str> = FoodCategory::all().iter().map(|c| c.value()).collect();
        println!("{}", to_json(&values)?);
    } else {
        for category in FoodCategory::all() {
            println!("{category}");
        }
    }
    Ok(())
}

fn print_summaries(recipes: &[RecipeSummary], json: bool) -> AppResult<()> {
    if json {
        println!("{}", to_json(recipes)?);
        return Ok(());
    }
    for recipe in recipes {
        println!(
            "{:>6}  {:<48}  {} ({})",
            recipe.id, recipe.title, recipe.publisher, recipe.rating
        );
    }
    Ok(())
}

fn open_store(state: Option<&PathBuf>, config: &Config) -> AppResult<Box<dyn StateStore>> {
    match state.or(config.session.state_path.as_ref()) {
        Some(path) => {
            let store = JsonFileStore::open(path.clone())?;
            tracing::debug!(path = %store.path().display(), "using session state file");
            Ok(Box::new(store))
        }
        None => Ok(Box::new(MemoryStore::new())),
    }
}

fn api_token(config: &Config) -> String {
    resolve_token(std::env::var("RBROWSE_TOKEN").ok(), &config.api.token)
}

fn resolve_token(env: Option<String>, configured: &str) -> String {
    env.filter(|token| !token.trim().is_empty())
        .unwrap_or_else(|| configured.to_string())
}

fn notice_error(notice: &Notice) -> AppError {
    AppError::internal(format!("{}: {}", notice.title, notice.message))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| AppError::internal(format!("failed to encode output: {err}")))
}
