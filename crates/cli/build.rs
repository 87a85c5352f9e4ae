use std::{env, fs, path::PathBuf};

use clap::{Arg, ArgAction, Command, arg};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let mut cmd = Command::new("leadgen")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Leadgen Contributors")
        .about("Find and qualify small-business leads")
        .arg(arg!(--"serpapi-key" <KEY> "SerpAPI key").env("SERPAPI_KEY"))
        .arg(arg!(--"llm-key" <KEY> "Key for the OpenAI-compatible chat endpoint").env("OPENROUTER_KEY"))
        .arg(arg!(--"hunter-key" <KEY> "Hunter.io key for email enrichment").env("HUNTER_KEY"))
        .arg(arg!(--"sheet-id" <ID> "Google Sheets spreadsheet id").env("SHEET_ID"))
        .arg(arg!(--"service-account-json" <JSON> "Service-account key as inline JSON").env("GOOGLE_SERVICE_ACCOUNT_JSON"))
        .arg(
            arg!(--"service-account-file" <FILE> "Service-account key file")
                .env("GOOGLE_SERVICE_ACCOUNT_FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(arg!(--"min-score" <SCORE> "Minimum final score for a lead to qualify").env("MIN_SCORE"))
        .arg(arg!(--"max-concurrent" <NUM> "Concurrent website fetches").env("MAX_CONCURRENT"))
        .arg(arg!(-v --verbose "Enable debug logging").global(true))
        .subcommand(
            Command::new("run")
                .about("Run the pipeline once")
                .arg(
                    Arg::new("query")
                        .short('q')
                        .long("query")
                        .value_name("QUERY")
                        .action(ArgAction::Append)
                        .help("Search target as \"<business type> in <city>\"; repeatable"),
                )
                .arg(arg!(--schedule "Use the weekly rotating query list for today"))
                .arg(arg!(--day <DAY> "Weekday for --schedule (0 = Monday)"))
                .arg(arg!(--"queries-json" <JSON> "JSON array of [business_type, city] pairs").env("SEARCH_QUERIES"))
                .arg(arg!(--"require-sheets" "Fail unless Google Sheets is configured"))
                .arg(
                    arg!(-o --output <FILE> "Write the full result as JSON to this file")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(arg!(--json "Print the full result as JSON to stdout")),
        )
        .subcommand(
            Command::new("check-config")
                .about("Show which settings are present and validate them")
                .arg(arg!(--"require-sheets" "Also require Google Sheets settings")),
        );

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "leadgen", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "leadgen", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "leadgen", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "leadgen", &completions_dir).unwrap();
}
