//! Command-line interface definition.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "vkinder", about = "Find and rank dating matches on VK")]
pub struct Args {
    /// Override how many matches `next` shows at a time.
    #[arg(short, long, global = true)]
    pub output: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search for new matches for a user, by numeric id or screen name.
    Find {
        user: String,
        /// Search in every city, not just the user's.
        #[arg(long)]
        ignore_city: bool,
        /// Ignore the age window around the user's age.
        #[arg(long)]
        ignore_age: bool,
        /// Search for the user's own sex.
        #[arg(long)]
        same_sex: bool,
    },
    /// Show the next unseen matches for a stored user.
    Next {
        user: i64,
        /// Write the page to a JSON file instead of printing details.
        #[arg(long)]
        export: bool,
    },
    /// List stored users.
    List,
    /// Delete a stored user and their matches.
    Delete { user: i64 },
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parses_find_with_flags() {
        let args = Args::parse_from(["vkinder", "find", "ava_dev", "--ignore-city", "--same-sex"]);
        match args.command {
            Command::Find {
                user,
                ignore_city,
                ignore_age,
                same_sex,
            } => {
                assert_eq!(user, "ava_dev");
                assert!(ignore_city);
                assert!(!ignore_age);
                assert!(same_sex);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_global_output_override() {
        let args = Args::parse_from(["vkinder", "next", "42", "--export", "--output", "5"]);
        assert_eq!(args.output, Some(5));
        assert!(matches!(
            args.command,
            Command::Next { user: 42, export: true }
        ));
    }
}
