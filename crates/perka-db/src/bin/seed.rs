//! # Seed Data Generator
//!
//! Populates the database with a demo menu, customers, and rewards for
//! development.
//!
//! ## Usage
//! ```bash
//! # Seed the default database
//! cargo run -p perka-db --bin seed
//!
//! # Specify database path
//! cargo run -p perka-db --bin seed -- --db ./data/perka.db
//! ```
//!
//! ## Generated Data
//! - A small café menu with size and milk options
//! - A handful of customers across membership tiers
//! - Reward definitions covering every kind (standard, discount coupon,
//!   tier perk, voucher) plus one pre-granted voucher instance

use chrono::{Duration, NaiveDate, Utc};
use std::env;
use uuid::Uuid;

use perka_core::{
    criteria::Criterion, Availability, Customer, MembershipTier, Product, ProductOption, Reward,
    RewardKind,
};
use perka_db::{Database, DbConfig};

/// Menu items: (name, base price in cents)
const MENU: &[(&str, i64)] = &[
    ("Espresso", 300),
    ("Americano", 350),
    ("Flat White", 450),
    ("Latte", 475),
    ("Cappuccino", 450),
    ("Mocha", 525),
    ("Cold Brew", 425),
    ("Chai Latte", 475),
    ("Hot Chocolate", 400),
    ("Croissant", 350),
    ("Blueberry Muffin", 325),
    ("Banana Bread", 375),
];

/// Size options: (label, price modifier in cents)
const SIZES: &[(&str, i64)] = &[("Small", -50), ("Medium", 0), ("Large", 75)];

/// Milk options: (label, price modifier in cents)
const MILKS: &[(&str, i64)] = &[("Whole", 0), ("Skim", 0), ("Oat", 75), ("Almond", 60)];

/// Demo customers: (name, tier, points, referrals)
const CUSTOMERS: &[(&str, MembershipTier, i64, i64)] = &[
    ("Ada Lovelace", MembershipTier::Platinum, 1200, 5),
    ("Grace Hopper", MembershipTier::Gold, 640, 3),
    ("Alan Turing", MembershipTier::Silver, 310, 1),
    ("Edsger Dijkstra", MembershipTier::Bronze, 45, 0),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./perka_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Perka Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./perka_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Perka Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!();

    // Connect to database
    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Check existing data
    let existing = db.catalog().list_products().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} products", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Seeding menu...");

    let now = Utc::now();

    for (name, price_cents) in MENU {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: None,
            base_price_cents: *price_cents,
            availability: Availability::Available,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.catalog().insert_product(&product).await?;

        // Options only make sense for drinks
        if *price_cents >= 300 && !name.contains("Croissant") && !name.contains("Muffin") {
            for (label, modifier) in SIZES {
                db.catalog()
                    .insert_option(&ProductOption {
                        id: Uuid::new_v4().to_string(),
                        product_id: product.id.clone(),
                        group_label: "Size".to_string(),
                        label: label.to_string(),
                        price_modifier_cents: *modifier,
                        is_active: true,
                    })
                    .await?;
            }
            for (label, modifier) in MILKS {
                db.catalog()
                    .insert_option(&ProductOption {
                        id: Uuid::new_v4().to_string(),
                        product_id: product.id.clone(),
                        group_label: "Milk".to_string(),
                        label: label.to_string(),
                        price_modifier_cents: *modifier,
                        is_active: true,
                    })
                    .await?;
            }
        }
    }

    println!("✓ Seeded {} products", MENU.len());

    println!();
    println!("Seeding customers...");

    let mut customer_ids = Vec::new();
    for (idx, (name, tier, points, referrals)) in CUSTOMERS.iter().enumerate() {
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            tier: *tier,
            points_balance: *points,
            birth_date: NaiveDate::from_ymd_opt(1990, 1 + idx as u32, 10),
            referral_count: *referrals,
            joined_at: now - Duration::days(400 - idx as i64 * 90),
        };
        db.customers().insert(&customer).await?;
        customer_ids.push(customer.id);
    }

    println!("✓ Seeded {} customers", CUSTOMERS.len());

    println!();
    println!("Seeding rewards...");

    let free_coffee_id = db
        .catalog()
        .list_products()
        .await?
        .into_iter()
        .find(|p| p.name == "Flat White")
        .map(|p| p.id)
        .unwrap_or_default();

    let rewards = vec![
        Reward {
            id: Uuid::new_v4().to_string(),
            kind: RewardKind::Standard,
            name: "Free Flat White".to_string(),
            points_cost: 200,
            percent_discount_bps: None,
            fixed_discount_cents: None,
            free_product_ids: vec![free_coffee_id],
            allow_multiple_claims: true,
            is_active: true,
            criteria: vec![Criterion::MinPoints { points: 200 }],
        },
        Reward {
            id: Uuid::new_v4().to_string(),
            kind: RewardKind::DiscountCoupon,
            name: "10% Off Your Order".to_string(),
            points_cost: 150,
            percent_discount_bps: Some(1000),
            fixed_discount_cents: None,
            free_product_ids: vec![],
            allow_multiple_claims: true,
            is_active: true,
            criteria: vec![Criterion::MinMonthlyPurchases { count: 2 }],
        },
        Reward {
            id: Uuid::new_v4().to_string(),
            kind: RewardKind::LoyaltyTierPerk,
            name: "Gold Birthday Treat: $5 Off".to_string(),
            points_cost: 0,
            percent_discount_bps: None,
            fixed_discount_cents: Some(500),
            free_product_ids: vec![],
            allow_multiple_claims: false,
            is_active: true,
            criteria: vec![
                Criterion::RequiredTiers {
                    tiers: vec![MembershipTier::Gold, MembershipTier::Platinum],
                },
                Criterion::BirthdayOnly,
            ],
        },
        Reward {
            id: Uuid::new_v4().to_string(),
            kind: RewardKind::Voucher,
            name: "$3 Welcome Voucher".to_string(),
            points_cost: 0,
            percent_discount_bps: None,
            fixed_discount_cents: Some(300),
            free_product_ids: vec![],
            allow_multiple_claims: false,
            is_active: true,
            criteria: vec![],
        },
    ];

    for reward in &rewards {
        db.rewards().insert_reward(reward).await?;
    }

    println!("✓ Seeded {} rewards", rewards.len());

    // Grant the welcome voucher to the first customer, 30-day expiry
    let voucher = db
        .rewards()
        .grant_voucher(
            &customer_ids[0],
            &rewards[3].id,
            Some(now + Duration::days(30)),
        )
        .await?;

    println!("✓ Granted welcome voucher {} to {}", voucher.id, CUSTOMERS[0].0);

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
