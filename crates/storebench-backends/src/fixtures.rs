//! Housing data generation.
//!
//! Deterministic property records shaped like the public housing-prices data
//! set, so runs against the embedded stores are reproducible without any
//! external import step.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use storebench_core::SqlValue;

/// Rows generated when the caller does not ask for a specific count.
pub const DEFAULT_ROWS: usize = 545;

/// Seed used by [`generate_properties`].
pub const SEED: u64 = 545;

/// Relational column order for inserts, excluding the generated `id`.
pub const COLUMNS: [&str; 13] = [
    "area",
    "bedrooms",
    "bathrooms",
    "stories",
    "mainroad",
    "guestroom",
    "basement",
    "hotwaterheating",
    "airconditioning",
    "parking",
    "prefarea",
    "furnishingstatus_id",
    "price",
];

/// Furnishing status of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Furnishing {
    Furnished,
    SemiFurnished,
    Unfurnished,
}

impl Furnishing {
    pub const ALL: [Furnishing; 3] = [
        Furnishing::Furnished,
        Furnishing::SemiFurnished,
        Furnishing::Unfurnished,
    ];

    /// Relational lookup id.
    pub fn id(&self) -> i64 {
        match self {
            Furnishing::Furnished => 1,
            Furnishing::SemiFurnished => 2,
            Furnishing::Unfurnished => 3,
        }
    }

    /// Label stored on documents.
    pub fn label(&self) -> &'static str {
        match self {
            Furnishing::Furnished => "furnished",
            Furnishing::SemiFurnished => "semi-furnished",
            Furnishing::Unfurnished => "unfurnished",
        }
    }
}

/// One property listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    pub area: i64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub stories: i64,
    pub mainroad: bool,
    pub guestroom: bool,
    pub basement: bool,
    pub hotwaterheating: bool,
    pub airconditioning: bool,
    pub parking: i64,
    pub prefarea: bool,
    pub furnishing: Furnishing,
    pub price: i64,
}

impl PropertyRecord {
    /// Insert parameters in [`COLUMNS`] order.
    pub fn sql_params(&self) -> Vec<SqlValue> {
        vec![
            self.area.into(),
            self.bedrooms.into(),
            self.bathrooms.into(),
            self.stories.into(),
            self.mainroad.into(),
            self.guestroom.into(),
            self.basement.into(),
            self.hotwaterheating.into(),
            self.airconditioning.into(),
            self.parking.into(),
            self.prefarea.into(),
            self.furnishing.id().into(),
            self.price.into(),
        ]
    }

    /// Nested document form used by the document store.
    pub fn to_document(&self, created_at: &str) -> Value {
        json!({
            "basic_info": {
                "area": self.area as f64,
                "bedrooms": self.bedrooms,
                "bathrooms": self.bathrooms,
                "stories": self.stories,
                "price": self.price as f64,
            },
            "features": {
                "mainroad": self.mainroad,
                "guestroom": self.guestroom,
                "basement": self.basement,
                "hotwaterheating": self.hotwaterheating,
                "airconditioning": self.airconditioning,
                "parking": self.parking,
                "prefarea": self.prefarea,
            },
            "furnishing_status": self.furnishing.label(),
            "metadata": {
                "created_at": created_at,
                "imported_at": created_at,
            },
        })
    }
}

/// The fixed listing written by the single-write scenario.
pub fn sample_property() -> PropertyRecord {
    PropertyRecord {
        area: 6000,
        bedrooms: 3,
        bathrooms: 2,
        stories: 2,
        mainroad: true,
        guestroom: false,
        basement: true,
        hotwaterheating: false,
        airconditioning: true,
        parking: 2,
        prefarea: true,
        furnishing: Furnishing::SemiFurnished,
        price: 6_500_000,
    }
}

/// Generate `count` property records with a realistic spread of values.
pub fn generate_properties(count: usize) -> Vec<PropertyRecord> {
    let mut rng = StdRng::seed_from_u64(SEED);

    (0..count)
        .map(|i| {
            let bedrooms = rng.gen_range(1..=6);
            PropertyRecord {
                area: rng.gen_range(1_650..=16_200),
                bedrooms,
                bathrooms: rng.gen_range(1..=4).min(bedrooms),
                stories: rng.gen_range(1..=4),
                mainroad: rng.gen_bool(0.86),
                guestroom: rng.gen_bool(0.18),
                basement: rng.gen_bool(0.35),
                hotwaterheating: rng.gen_bool(0.05),
                airconditioning: rng.gen_bool(0.32),
                parking: rng.gen_range(0..=3),
                prefarea: rng.gen_bool(0.23),
                furnishing: Furnishing::ALL[i % Furnishing::ALL.len()],
                // Listed prices move in 35k steps between 1.75M and 13.3M.
                price: rng.gen_range(50..=380) * 35_000,
            }
        })
        .collect()
}
