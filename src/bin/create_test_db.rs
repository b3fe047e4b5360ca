use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use rust_decimal::Decimal;
use time::{Duration, macros::datetime};

use fraudwatch::{
    initialize_db,
    timestamp::Timestamp,
    transaction::{TransactionRecord, insert_transaction},
};

/// A utility for creating a test database for the fraudwatch REST API server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: PathBuf,

    /// A CSV file to import instead of generating sample transactions.
    ///
    /// The header row must use the column names of the transaction table.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// How many sample transactions to generate when no CSV file is given.
    #[arg(long, default_value_t = 200)]
    rows: usize,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = args.output_path.as_path();

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let mut conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    let tx = conn.transaction()?;
    let count = match &args.csv {
        Some(csv_path) => import_csv(csv_path, &tx)?,
        None => insert_sample_transactions(args.rows, &tx)?,
    };
    tx.commit()?;

    println!("Inserted {count} transactions.");
    println!("Success!");

    Ok(())
}

fn import_csv(csv_path: &Path, conn: &Connection) -> Result<usize, Box<dyn Error>> {
    println!("Importing transactions from {csv_path:#?}...");

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut count = 0;

    for (line, record) in reader.deserialize::<TransactionRecord>().enumerate() {
        // Line 1 is the header.
        let record = record.map_err(|error| format!("line {}: {error}", line + 2))?;
        insert_transaction(&record, conn)?;
        count += 1;
    }

    Ok(count)
}

const CATEGORIES: [&str; 5] = ["Food", "Travel", "Retail", "Online", "Other"];

fn insert_sample_transactions(rows: usize, conn: &Connection) -> Result<usize, Box<dyn Error>> {
    println!("Creating {rows} sample transactions...");

    let start = datetime!(2024-01-01 00:00);
    // A small linear congruential generator keeps the sample data the same on every run.
    let mut seed: u64 = 42;
    let mut next = move || {
        seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        seed >> 33
    };

    for i in 0..rows {
        let customer = next() % 50;
        let amount = Decimal::new((next() % 500_000) as i64 + 100, 2);
        let anomaly_score = Decimal::new((next() % 10_000) as i64, 4);
        let fraud_indicator = anomaly_score > Decimal::new(95, 2);

        let record = TransactionRecord {
            transaction_id: format!("T{:06}", i + 1),
            amount,
            customer_id: format!("C{customer:04}"),
            category: CATEGORIES[(next() % CATEGORIES.len() as u64) as usize].to_owned(),
            anomaly_score,
            transaction_amount: amount,
            account_balance: Decimal::new((next() % 10_000_000) as i64, 2),
            last_login: Timestamp::new(start + Duration::minutes((next() % 525_600) as i64)),
            name: format!("Customer {customer}"),
            age: 18 + (customer as i64 % 60),
            address: format!("{} Example Street", customer + 1),
            timestamp: Timestamp::new(start + Duration::minutes((i as i64) * 90)),
            merchant_id: format!("M{:03}", next() % 100),
            fraud_indicator,
            suspicious_flag: fraud_indicator || anomaly_score > Decimal::new(80, 2),
        };

        insert_transaction(&record, conn)?;
    }

    Ok(rows)
}
