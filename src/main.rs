use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use vkinder::app::{App, SearchOptions};
use vkinder::cli::{Args, Command};
use vkinder::config::Config;
use vkinder::profile::PromptResolver;
use vkinder::vk::VkApi;
use vkinder::{data, logging};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(output) = args.output {
        config.output_amount = output;
    }

    logging::setup(&config.log_level);

    match run(args.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    let pool = data::connect(&config.database_url).await?;
    let provider = Arc::new(VkApi::new(
        &config.api_url,
        &config.api_version,
        &config.access_token,
    ));
    let mut app = App::new(provider, pool, config);

    match command {
        Command::Find {
            user,
            ignore_city,
            ignore_age,
            same_sex,
        } => {
            let summary = app.set_user(&user, &PromptResolver).await?;
            println!(
                "Searching matches for {} {} (id {})...",
                summary.name, summary.surname, summary.uid
            );
            let options = SearchOptions {
                ignore_city,
                ignore_age,
                same_sex,
            };
            let count = app.spawn_matches(&options).await?;
            println!(
                "Processed {count} candidates. Run `vkinder next {}` to browse them.",
                summary.uid
            );
        }
        Command::Next { user, export } => {
            let page = app.next_matches(user, export).await?;
            if page.is_empty() {
                println!("No unseen matches left for user {user}.");
            } else if export {
                println!("Exported {} matches for user {user}.", page.len());
            } else {
                for m in &page {
                    println!("{} {} (score {})", m.name, m.surname, m.total_score);
                    println!("  {}", m.profile);
                    for link in &m.photos {
                        println!("  {link}");
                    }
                }
            }
        }
        Command::List => {
            let listed = app.list_users().await?;
            if listed.is_empty() {
                println!("No stored users.");
            } else {
                for user in &listed {
                    println!("{}  {} {} ({})", user.uid, user.name, user.surname, user.age);
                }
            }
        }
        Command::Delete { user } => {
            if app.delete_user(user).await? {
                println!("Deleted user {user} and their matches.");
            } else {
                println!("No stored user {user}.");
            }
        }
    }

    Ok(())
}
