use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;

use smartwallet::initialize_db;

/// A utility for creating the SmartWallet database schema.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path of the SQLite database, created if it does not exist.
    #[arg(long, short)]
    db_path: String,
}

/// Create the tables in a new or existing database. Existing data is kept.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let db_path = Path::new(&args.db_path);

    if db_path.is_dir() {
        eprintln!("{db_path:#?} is a directory, expected a database file.");
        exit(1);
    }

    println!("Initializing database at {db_path:#?}");
    let conn = Connection::open(db_path)?;

    initialize_db(&conn)?;

    println!("Success!");

    Ok(())
}
