//! Demo data seeding.
//!
//! Inserts claimable orders with a few line items each so the available
//! list has something to show on a fresh database.

use rand::Rng;
use rand::seq::IndexedRandom;
use rust_decimal::Decimal;
use serde_json::json;

use courier_portal::db::PgStore;
use courier_portal::models::{NewOrder, NewOrderItem};
use courier_portal_core::OrderStatus;

use super::{CliError, connect};

/// (id, name, unit price in cents)
const MEDICINES: &[(&str, &str, i64)] = &[
    ("med-paracetamol-500", "Paracetamol 500mg", 499),
    ("med-ibuprofen-200", "Ibuprofen 200mg", 650),
    ("med-cetirizine-10", "Cetirizine 10mg", 825),
    ("med-omeprazole-20", "Omeprazole 20mg", 1150),
    ("med-vitamin-d3", "Vitamin D3 1000IU", 975),
    ("med-ors-sachet", "Oral Rehydration Salts", 250),
];

const STREETS: &[(&str, &str, &str, &str)] = &[
    ("14 Harbour Road", "Portsmouth", "Hampshire", "PO1 3AX"),
    ("221 Elm Street", "Springfield", "IL", "62704"),
    ("8 Rue des Lilas", "Lyon", "Auvergne-Rhone-Alpes", "69003"),
    ("57 King Street", "Newtown", "NSW", "2042"),
];

/// Insert `count` demo orders.
pub async fn orders(count: u32) -> Result<(), CliError> {
    if count == 0 {
        return Err(CliError::InvalidArgument("count must be at least 1".to_owned()));
    }

    let store = PgStore::new(connect().await?);

    for _ in 0..count {
        let order = demo_order(&mut rand::rng());
        let id = store.insert_order(&order).await?;
        tracing::info!(order_id = %id, total = %order.total_price, "Seeded order");
    }

    tracing::info!("Seeded {count} orders");
    Ok(())
}

fn demo_order(rng: &mut impl Rng) -> NewOrder {
    let line_count = rng.random_range(1..=3);
    let items: Vec<NewOrderItem> = MEDICINES
        .choose_multiple(rng, line_count)
        .map(|(id, name, cents)| NewOrderItem {
            medicine_id: (*id).to_owned(),
            medicine_name: Some((*name).to_owned()),
            quantity: rng.random_range(1..=4),
            price: Decimal::new(*cents, 2),
        })
        .collect();

    let total_price = items
        .iter()
        .map(|item| item.price * Decimal::from(item.quantity))
        .sum();

    let delivery_address = STREETS.choose(rng).map_or(serde_json::Value::Null, |(street, city, state, zip)| {
        json!({ "street": street, "city": city, "state": state, "zip": zip })
    });

    let status = if rng.random_bool(0.5) {
        OrderStatus::Paid
    } else {
        OrderStatus::Pending
    };

    NewOrder {
        total_price,
        delivery_address,
        status,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_order_is_claimable_and_consistent() {
        let mut rng = rand::rng();
        for _ in 0..20 {
            let order = demo_order(&mut rng);
            assert!(order.status.is_claimable());
            assert!((1..=3).contains(&order.items.len()));

            let sum: Decimal = order
                .items
                .iter()
                .map(|i| i.price * Decimal::from(i.quantity))
                .sum();
            assert_eq!(order.total_price, sum);
        }
    }
}
