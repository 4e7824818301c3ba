// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("archdeps")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Archdeps Contributors")
        .about("Repository indexing and SAT-based dependency resolution for Arch-style systems")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .default_value("/etc/archdeps/config.json")
                .global(true)
                .help("Configuration file"),
        )
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .value_name("DIR")
                .global(true)
                .help("Prefix applied to every configured directory"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("sync")
                .about("Synchronize repository databases and cross-reference installed packages")
                .arg(
                    Arg::new("offline")
                        .long("offline")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("force")
                        .help("Use cached databases only"),
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Download every database even if the cache is fresh"),
                ),
        )
        .subcommand(
            Command::new("search")
                .about("Search repositories by name and description")
                .arg(Arg::new("term").required(true).help("Substring to look for"))
                .arg(
                    Arg::new("aur")
                        .long("aur")
                        .action(ArgAction::SetTrue)
                        .help("Also query the AUR"),
                )
                .arg(
                    Arg::new("limit")
                        .short('n')
                        .long("limit")
                        .default_value("50")
                        .help("Maximum number of results"),
                ),
        )
        .subcommand(
            Command::new("resolve")
                .about("Compute the install set keeping every explicitly installed package")
                .arg(
                    Arg::new("no_conflicts")
                        .long("no-conflicts")
                        .action(ArgAction::SetTrue)
                        .help("Ignore declared conflicts"),
                ),
        )
        .subcommand(
            Command::new("vercmp")
                .about("Compare two version strings")
                .arg(Arg::new("a").required(true))
                .arg(Arg::new("b").required(true)),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "elvish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("archdeps.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
