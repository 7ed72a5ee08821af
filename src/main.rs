use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use puppet_auth::{
    apply_manifest, apply_rules, load_from_path, ApplicationError, ApplyOptions, AuthRule,
    MapperError, RuleMapper, RuleOutcome, TargetReport, Transaction, DEFAULT_TARGET,
};
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "puppet-auth")]
#[command(about = "Structured editor for Puppet auth.conf files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the rules in an auth.conf file
    List {
        /// auth.conf file to read
        #[arg(short, long, env = "PUPPET_AUTH_TARGET", default_value = DEFAULT_TARGET)]
        target: PathBuf,

        /// Print rules as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply the rules in a TOML manifest
    Apply {
        /// Rule manifest to apply
        #[arg(short, long)]
        rules: PathBuf,

        /// auth.conf file for rules when neither the rule nor the manifest names one
        #[arg(short, long, env = "PUPPET_AUTH_TARGET", default_value = DEFAULT_TARGET)]
        target: PathBuf,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Remove the rule for a path
    Remove {
        /// Path the rule applies to
        path: String,

        /// The path is a regular expression
        #[arg(long)]
        regex: bool,

        /// auth.conf file to edit
        #[arg(short, long, env = "PUPPET_AUTH_TARGET", default_value = DEFAULT_TARGET)]
        target: PathBuf,
    },

    /// Print the tree nodes matching an expression
    Print {
        /// auth.conf file to read
        #[arg(short, long, env = "PUPPET_AUTH_TARGET", default_value = DEFAULT_TARGET)]
        target: PathBuf,

        /// Path expression, e.g. `path[.='/facts']`
        #[arg(default_value = "*")]
        expr: String,
    },
}

fn main() -> Result<()> {
    puppet_auth::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::List { target, json } => cmd_list(&target, json),

        Commands::Apply {
            rules,
            target,
            dry_run,
            diff,
        } => cmd_apply(&rules, target, dry_run, diff),

        Commands::Remove {
            path,
            regex,
            target,
        } => cmd_remove(path, regex, target),

        Commands::Print { target, expr } => cmd_print(&target, &expr),
    }
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (modified)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_list(target: &Path, json: bool) -> Result<()> {
    let tx = Transaction::open(target, false)?;
    let instances = RuleMapper::new().instances(tx.document())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&instances)?);
        return Ok(());
    }

    if instances.is_empty() {
        println!("{}", "No rules found".yellow());
        return Ok(());
    }

    for instance in &instances {
        let marker = if instance.path_regex { "~ " } else { "" };
        println!("{} {}{}", "•".cyan(), marker, instance.path.bold());
        println!("  name: {}", instance.name.dimmed());
        for (label, values) in [
            ("environments", &instance.environments),
            ("methods", &instance.methods),
            ("allow", &instance.allow),
            ("allow_ip", &instance.allow_ip),
        ] {
            if !values.is_empty() {
                println!("  {}: {}", label, values.join(", "));
            }
        }
        if instance.authenticated != puppet_auth::Authenticated::Absent {
            println!("  authenticated: {}", instance.authenticated);
        }
    }

    Ok(())
}

fn cmd_apply(
    rules: &Path,
    target: PathBuf,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    println!("Loading rules from {}...", rules.display());
    let manifest = load_from_path(rules)?;

    let options = ApplyOptions {
        dry_run,
        default_target: target,
        ..ApplyOptions::default()
    };
    if dry_run {
        println!("{}", "  [DRY RUN - nothing will be written]".cyan());
    }

    let reports = apply_manifest(&manifest, &options);
    let failed = report(&reports, dry_run, show_diff);
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_remove(path: String, regex: bool, target: PathBuf) -> Result<()> {
    let mut rule = AuthRule::new(path.clone(), path).absent().target(target);
    if regex {
        rule = rule.regex();
    }

    let options = ApplyOptions {
        create_missing: false,
        ..ApplyOptions::default()
    };
    let reports = apply_rules(&[rule], &options);
    if report(&reports, false, false) > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_print(target: &Path, expr: &str) -> Result<()> {
    let tx = Transaction::open(target, false)?;
    print!("{}", tx.document().dump(expr)?);
    Ok(())
}

/// Print per-rule results and a summary. Returns the number of failed rules.
fn report(reports: &[TargetReport], dry_run: bool, show_diff: bool) -> usize {
    let mut total_changed = 0;
    let mut total_unchanged = 0;
    let mut total_failed = 0;

    for target in reports {
        println!("Target: {}", target.target.display());

        for (name, result) in &target.results {
            match result {
                Ok(outcome) if outcome.changed() => {
                    if dry_run {
                        println!("{} {}: Would be {}", "✓".green(), name, outcome);
                    } else {
                        println!("{} {}: {}", "✓".green(), name, capitalize(&outcome.to_string()));
                    }
                    total_changed += 1;
                }
                Ok(outcome) => {
                    let symbol = match outcome {
                        RuleOutcome::AlreadyAbsent => "⊘".cyan(),
                        _ => "⊙".yellow(),
                    };
                    println!("{} {}: {}", symbol, name, capitalize(&outcome.to_string()));
                    total_unchanged += 1;
                }
                Err(e) => {
                    eprintln!("{} {}: Error - {}", "✗".red(), name, e);
                    total_failed += 1;
                    explain(e);
                }
            }
        }

        if show_diff && target.changed() {
            display_diff(&target.target, &target.before, &target.after);
        }

        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} changed", format!("{}", total_changed).green());
    println!("  {} unchanged", format!("{}", total_unchanged).yellow());
    println!("  {} failed", format!("{}", total_failed).red());

    total_failed
}

/// Extra diagnostics for failures a user can act on.
fn explain(error: &ApplicationError) {
    match error {
        ApplicationError::Rule(MapperError::AmbiguousMatch { path, count }) => {
            eprintln!(
                "  {}",
                format!("CONFLICT: {} stanzas match {} (expected 1)", count, path).red()
            );
            eprintln!("  Action: remove the duplicate stanzas by hand");
        }
        ApplicationError::Rule(MapperError::Anchor { anchor, count }) => {
            eprintln!(
                "  {}",
                format!("Anchor {:?} matched {} stanzas (expected 1)", anchor, count).red()
            );
        }
        ApplicationError::Load { path, .. } => {
            eprintln!("  File: {}", path.display());
            eprintln!("  The file was left untouched");
        }
        _ => {}
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
