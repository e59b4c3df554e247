use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use rowbind_core::TableDescriptor;
use rowbind_dict::{ConnectionConfig, Dictionary};
use rowbind_mysql::{Connection, MysqlClient, SchemaSync, create_index_sql, create_table_sql};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rowbind")]
#[command(version)]
#[command(about = "Dictionary validation and MySQL schema synchronization")]
struct Cli {
    /// Log filter used when RUST_LOG is not set (e.g. info, debug).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate dictionary files and/or directories.
    Validate(ValidateArgs),
    /// Print the DDL that creates the dictionary's tables.
    Ddl(DdlArgs),
    /// Bring a database in line with a dictionary.
    Sync(SyncArgs),
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// Dictionary files (.json, .yml, .yaml) and/or directories of them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct DdlArgs {
    /// Dictionary file or directory.
    dictionary: PathBuf,
    /// Only this table.
    #[arg(long)]
    table: Option<String>,
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Dictionary file or directory.
    dictionary: PathBuf,
    /// Connection configuration (YAML).
    #[arg(long)]
    config: PathBuf,
    /// Only this table.
    #[arg(long)]
    table: Option<String>,
    /// Never add or modify columns; missing tables and indices are still
    /// created.
    #[arg(long)]
    no_alter: bool,
    /// Print the planned DDL without executing it.
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Validate(args) => run_validate(args),
        Command::Ddl(args) => run_ddl(args),
        Command::Sync(args) => run_sync(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn load_dictionary(path: &Path) -> Result<Dictionary, String> {
    let dictionary = if path.is_dir() {
        Dictionary::from_dir(path)
    } else {
        Dictionary::from_file(path)
    };
    dictionary.map_err(|e| format!("{}: {e}", path.display()))
}

fn load_validated(path: &Path) -> Result<Dictionary, String> {
    load_dictionary(path)?
        .validated()
        .map_err(|e| format!("{}: {e}", path.display()))
}

fn select_tables<'d>(dictionary: &'d Dictionary, table: Option<&str>) -> Result<Vec<&'d TableDescriptor>, String> {
    match table {
        Some(name) => dictionary
            .get_table(name)
            .map(|table| vec![table])
            .ok_or_else(|| format!("table '{name}' not found in dictionary")),
        None => Ok(dictionary.tables().iter().collect()),
    }
}

fn run_validate(args: ValidateArgs) -> Result<(), String> {
    let mut invalid = 0;
    let mut tables = 0;

    for input in &args.inputs {
        let dictionary = load_dictionary(input)?;
        let errors = dictionary.validate();
        tables += dictionary.len();
        for err in &errors {
            eprintln!("{}: {err}", input.display());
        }
        if !errors.is_empty() {
            invalid += 1;
        }
    }

    if invalid > 0 {
        return Err(format!("{invalid} of {} dictionary input(s) invalid", args.inputs.len()));
    }
    println!(
        "Validated {} dictionary input(s) with {tables} table(s).",
        args.inputs.len()
    );
    Ok(())
}

fn run_ddl(args: DdlArgs) -> Result<(), String> {
    let dictionary = load_validated(&args.dictionary)?;

    for table in select_tables(&dictionary, args.table.as_deref())? {
        println!("{}", create_table_sql(table));
        for index in &table.indices {
            if let Some(sql) = create_index_sql(table, index) {
                println!("{sql}");
            }
        }
    }
    Ok(())
}

fn run_sync(args: SyncArgs) -> Result<(), String> {
    let dictionary = load_validated(&args.dictionary)?;
    let tables = select_tables(&dictionary, args.table.as_deref())?;
    let config = ConnectionConfig::load(&args.config).map_err(|e| format!("{}: {e}", args.config.display()))?;

    let client = MysqlClient::new().map_err(|e| e.to_string())?;
    let conn = Connection::new(config, client);
    conn.connect().map_err(|e| e.to_string())?;
    let allow_alter = !args.no_alter;

    let mut failed = 0;
    for table in tables {
        let sync = SchemaSync::new(&conn, table);

        if args.dry_run {
            for statement in sync.plan(allow_alter).map_err(|e| e.to_string())? {
                println!("{}", statement.sql);
            }
            continue;
        }

        let report = sync.synchronize(allow_alter).map_err(|e| format!("{}: {e}", table.name))?;
        if report.is_empty() {
            println!("{}: up to date", report.table);
        }
        for statement in &report.applied {
            println!("{}: {}", report.table, statement.sql);
        }
        for statement in &report.failed {
            eprintln!("{}: failed: {}", report.table, statement.sql);
        }
        failed += report.failed.len();
    }

    if failed > 0 {
        return Err(format!("{failed} schema change(s) failed"));
    }
    Ok(())
}
