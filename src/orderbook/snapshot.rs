//! Read-only views of one side of the book

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use super::{GroupedLevel, Level, Order};

/// Flatten one side into price/volume entries.
///
/// `descending` puts the highest price first (bids). Orders at the same
/// price keep a stable order by id.
pub fn flatten(orders: &HashMap<String, Order>, descending: bool) -> Vec<Level> {
    let mut sorted: Vec<&Order> = orders.values().collect();
    sorted.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.id.cmp(&b.id)));
    if descending {
        sorted.reverse();
    }

    sorted
        .into_iter()
        .map(|o| Level {
            price: o.price,
            volume: o.volume,
        })
        .collect()
}

/// Merge one side by integer-truncated price, summing volume and counting orders
pub fn group_by_price(orders: &HashMap<String, Order>, descending: bool) -> Vec<GroupedLevel> {
    let mut groups: BTreeMap<Decimal, (Decimal, u64)> = BTreeMap::new();
    for order in orders.values() {
        let entry = groups
            .entry(order.price.trunc())
            .or_insert((Decimal::ZERO, 0));
        entry.0 = entry.0.saturating_add(order.volume);
        entry.1 += 1;
    }

    let levels = groups
        .into_iter()
        .map(|(price, (volume, count))| GroupedLevel {
            price,
            volume,
            count,
        });

    if descending {
        levels.rev().collect()
    } else {
        levels.collect()
    }
}
