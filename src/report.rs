//! The "most used ingredients" report.
//!
//! Rows are built from every recipe/ingredient usage record. `times_used`
//! counts the usage records of an ingredient across *all* recipes and is
//! repeated on each of that ingredient's rows, while the quantity and cost
//! totals stay per recipe/ingredient pair.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

/// Shown instead of a category name for ingredients without one.
pub(crate) const UNCATEGORIZED: &str = "uncategorized";

/// One usage record joined with ingredient and category metadata.
#[derive(Debug, Clone, PartialEq, Queryable)]
pub(crate) struct UsageRecord {
    pub recipe_id: i32,
    pub ingredient_id: i32,
    pub ingredient_name: String,
    pub presentation: String,
    pub purchase_price: f64,
    pub category_name: Option<String>,
    pub quantity_used: f64,
    pub cost_of_use: f64,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct UsageRow {
    pub recipe_id: i32,
    pub ingredient_id: i32,
    pub ingredient_name: String,
    pub presentation: String,
    pub purchase_price: f64,
    pub category_name: String,
    pub times_used: i64,
    pub total_quantity_used: f64,
    pub total_cost_of_use: f64,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct UsageSummary {
    pub distinct_ingredients: usize,
    pub total_uses: usize,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct DashboardStats {
    pub total_ingredients: i64,
    pub total_recipes: i64,
    pub total_categories: i64,
    pub total_menus: i64,
}

/// Folds usage records into report rows, most used ingredient first.
pub(crate) fn aggregate(records: Vec<UsageRecord>) -> Vec<UsageRow> {
    let mut times_used: HashMap<i32, i64> = HashMap::new();
    for record in &records {
        *times_used.entry(record.ingredient_id).or_default() += 1;
    }

    let mut pairs: BTreeMap<(i32, i32), UsageRow> = BTreeMap::new();
    for record in records {
        let row = pairs
            .entry((record.recipe_id, record.ingredient_id))
            .or_insert_with(|| UsageRow {
                recipe_id: record.recipe_id,
                ingredient_id: record.ingredient_id,
                ingredient_name: record.ingredient_name.clone(),
                presentation: record.presentation.clone(),
                purchase_price: record.purchase_price,
                category_name: record
                    .category_name
                    .clone()
                    .unwrap_or_else(|| UNCATEGORIZED.to_string()),
                times_used: times_used[&record.ingredient_id],
                total_quantity_used: 0.0,
                total_cost_of_use: 0.0,
                image: record.image.clone(),
            });
        row.total_quantity_used += record.quantity_used;
        row.total_cost_of_use += record.cost_of_use;
    }

    let mut rows: Vec<UsageRow> = pairs.into_values().collect();
    rows.sort_by(|a, b| {
        b.times_used
            .cmp(&a.times_used)
            .then_with(|| a.ingredient_name.cmp(&b.ingredient_name))
            .then_with(|| a.recipe_id.cmp(&b.recipe_id))
            .then_with(|| a.ingredient_id.cmp(&b.ingredient_id))
    });
    rows
}

pub(crate) fn summarize(rows: &[UsageRow]) -> UsageSummary {
    let distinct: HashSet<i32> = rows.iter().map(|row| row.ingredient_id).collect();
    UsageSummary {
        distinct_ingredients: distinct.len(),
        total_uses: rows.len(),
        total_cost: rows.iter().map(|row| row.total_cost_of_use).sum(),
    }
}
