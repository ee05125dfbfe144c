//! Synthetic Data Generator - Artificial sales orders for the demo table
//!
//! Every categorical field is drawn from a closed vocabulary, and the money
//! fields that depend on each other (total_sales, profit) are computed from the
//! drawn quantity/prices instead of being drawn themselves.
//!
//! Order dates are placed cyclically: row `i` lands on `2023-01-01 + (i % 365)`
//! days, so every day of the year receives the same number of orders (±1) and
//! monthly trend queries reflect the drawn amounts rather than date noise.

use crate::error::{Nl2SqlError, Result};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Rows generated when nothing else is configured
pub const DEFAULT_ROW_COUNT: usize = 1000;
/// Smallest dataset the CLI offers
pub const MIN_ROWS: usize = 100;
/// Largest dataset the CLI offers
pub const MAX_ROWS: usize = 5000;

/// Length of the order date window in days
pub const DATE_WINDOW_DAYS: i64 = 365;

const FIRST_ORDER_NUMBER: usize = 10_000;

macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            fn draw(rng: &mut StdRng) -> Self {
                Self::ALL[rng.gen_range(0..Self::ALL.len())]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocabulary!(
    /// Product sold in an order
    Product {
        LaptopPro => "Laptop Pro",
        PhoneX => "Phone X",
        TabletAir => "Tablet Air",
        MonitorUltra => "Monitor Ultra",
        KeyboardElite => "Keyboard Elite",
        MousePro => "Mouse Pro",
        HeadphonesMax => "Headphones Max",
        ChargerFast => "Charger Fast",
        CasePremium => "Case Premium",
        StandAdjustable => "Stand Adjustable",
    }
);

vocabulary!(
    Category {
        Electronics => "Electronics",
        Accessories => "Accessories",
        Computers => "Computers",
        Mobile => "Mobile",
    }
);

vocabulary!(
    /// Sales region
    Region {
        NorthAmerica => "North America",
        Europe => "Europe",
        AsiaPacific => "Asia Pacific",
        LatinAmerica => "Latin America",
        MiddleEast => "Middle East",
    }
);

vocabulary!(
    PaymentMethod {
        CreditCard => "Credit Card",
        PayPal => "PayPal",
        BankTransfer => "Bank Transfer",
        Cash => "Cash",
    }
);

vocabulary!(
    CustomerType {
        New => "New",
        Returning => "Returning",
        Vip => "VIP",
    }
);

/// One synthetic sales transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub customer_id: String,
    pub order_date: NaiveDate,
    pub product: Product,
    pub category: Category,
    pub region: Region,
    pub quantity: u32,
    pub unit_price: f64,
    /// Always `round2(quantity * unit_price)`
    pub total_sales: f64,
    pub cost_price: f64,
    /// `round2((unit_price - cost_price) * quantity)`
    pub profit: f64,
    pub payment_method: PaymentMethod,
    pub customer_type: CustomerType,
    /// Fraction in `[0, 1)`
    pub discount: f64,
}

/// Round a currency amount to cents.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// First day of the order date window.
pub fn window_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).expect("2023-01-01 is a valid date")
}

/// Generate `row_count` orders. With a seed the result is fully reproducible.
pub fn generate(row_count: usize, seed: Option<u64>) -> Result<Vec<OrderRecord>> {
    if row_count == 0 {
        return Err(Nl2SqlError::InvalidArgument(
            "row_count must be greater than zero".to_string(),
        ));
    }

    debug!(row_count, ?seed, "generating synthetic sales data");

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let start = window_start();

    Ok((0..row_count)
        .map(|i| generate_record(i, start, &mut rng))
        .collect())
}

fn generate_record(index: usize, start: NaiveDate, rng: &mut StdRng) -> OrderRecord {
    let customer_number: u32 = rng.gen_range(1000..=9999);
    let quantity: u32 = rng.gen_range(1..=5);
    let unit_price = round2(rng.gen_range(50.0..2000.0));
    let cost_price = round2(unit_price * rng.gen_range(0.4..0.7));
    let product = Product::draw(rng);
    let category = Category::draw(rng);
    let region = Region::draw(rng);
    let payment_method = PaymentMethod::draw(rng);
    let customer_type = CustomerType::draw(rng);
    let discount = round2(rng.gen_range(0.0..0.3));

    let day_offset = (index as i64) % DATE_WINDOW_DAYS;

    OrderRecord {
        order_id: format!("ORD{}", FIRST_ORDER_NUMBER + index),
        customer_id: format!("CUST{}", customer_number),
        order_date: start + Duration::days(day_offset),
        product,
        category,
        region,
        quantity,
        unit_price,
        total_sales: round2(quantity as f64 * unit_price),
        cost_price,
        profit: round2((unit_price - cost_price) * quantity as f64),
        payment_method,
        customer_type,
        discount,
    }
}
