//! # Seed Data Generator
//!
//! Populates a development database with outlets, a sales rep, products
//! and an opening stock grant for every (client, product) pair.
//!
//! ## Usage
//! ```bash
//! # 10 clients × 50 products, 100 units each (defaults)
//! cargo run -p uplift-db --bin seed
//!
//! # Custom sizes
//! cargo run -p uplift-db --bin seed -- --clients 25 --products 200 --stock 40
//!
//! # Specify database path (overrides UPLIFT_DATABASE_PATH)
//! cargo run -p uplift-db --bin seed -- --db ./data/uplift.db
//! ```
//!
//! Log output follows `UPLIFT_LOG` (e.g. `UPLIFT_LOG=uplift_db=debug`).

use std::env;
use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uplift_core::LedgerKey;
use uplift_db::repository::catalog::CatalogTable;
use uplift_db::{Database, Settings};

const OUTLETS: &[&str] = &[
    "Corner Shop",
    "Mini Mart",
    "Fuel Stop",
    "Campus Kiosk",
    "Station Deli",
    "Harbour Store",
];

const PRODUCTS: &[&str] = &[
    "Cola 330ml",
    "Cola 1.5L",
    "Orange Soda 330ml",
    "Still Water 500ml",
    "Sparkling Water 500ml",
    "Energy Drink 250ml",
    "Iced Tea 500ml",
    "Salted Crisps 50g",
    "Chilli Crisps 50g",
    "Chocolate Bar 45g",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut settings = Settings::from_env()?;

    let mut clients: usize = 10;
    let mut products: usize = 50;
    let mut stock: i64 = 100;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" | "-c" => {
                if i + 1 < args.len() {
                    clients = args[i + 1].parse().unwrap_or(clients);
                    i += 1;
                }
            }
            "--products" | "-p" => {
                if i + 1 < args.len() {
                    products = args[i + 1].parse().unwrap_or(products);
                    i += 1;
                }
            }
            "--stock" | "-s" => {
                if i + 1 < args.len() {
                    stock = args[i + 1].parse().unwrap_or(stock);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    settings.database_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Uplift Stock Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --clients <N>   Number of clients (default: 10)");
                println!("  -p, --products <N>  Number of products (default: 50)");
                println!("  -s, --stock <N>     Opening stock per client/product (default: 100)");
                println!("  -d, --db <PATH>     Database file path (default: ./uplift_dev.db)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!(
        database = %settings.database_path.display(),
        clients,
        products,
        stock,
        "Seeding uplift database"
    );

    let db = Database::new(settings.db_config()).await?;
    let catalog = db.catalog();

    let existing = catalog.count(CatalogTable::Clients).await?;
    if existing > 0 {
        warn!(
            existing,
            "Database already has clients; skipping seed. Delete the file to regenerate."
        );
        return Ok(());
    }

    let start = std::time::Instant::now();

    let mut client_ids = Vec::with_capacity(clients);
    for n in 0..clients {
        let name = format!("{} #{}", OUTLETS[n % OUTLETS.len()], n + 1);
        client_ids.push(catalog.insert_client(&name).await?);
    }

    let rep = catalog.insert_user("Seed Sales Rep").await?;

    let mut product_ids = Vec::with_capacity(products);
    for n in 0..products {
        let name = format!("{} v{}", PRODUCTS[n % PRODUCTS.len()], n / PRODUCTS.len() + 1);
        product_ids.push(catalog.insert_product(&name).await?);
    }

    let ledger = db.ledger();
    let mut granted = 0usize;
    for client_id in &client_ids {
        for product_id in &product_ids {
            ledger
                .upsert_set(LedgerKey::new(*client_id, *product_id), stock)
                .await?;
            granted += 1;
        }
    }

    info!(
        clients = client_ids.len(),
        sales_rep = rep,
        products = product_ids.len(),
        stock_rows = granted,
        elapsed = ?start.elapsed(),
        "Seed complete"
    );

    db.close().await;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("UPLIFT_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
