//! `motion-probe categories`: list the built-in site categories.

use super::output::{self, Styled};
use crate::sites::{self, CATEGORIES};
use anyhow::Result;
use serde_json::json;

/// Run the categories command.
pub fn run(show_urls: bool) -> Result<()> {
    if output::is_json() {
        let mut list: Vec<serde_json::Value> = CATEGORIES
            .iter()
            .map(|c| json!({"name": c.name, "description": c.description, "urls": c.sites}))
            .collect();
        list.push(json!({
            "name": "all",
            "description": "awwwards, agencies, ecommerce and portfolios combined",
            "urls": sites::category_urls("all").unwrap_or_default(),
        }));
        output::print_json(&serde_json::Value::Array(list));
        return Ok(());
    }

    let s = Styled::new();
    output::print_section(&s, "Categories");
    for category in CATEGORIES {
        output::print_row(
            &s.cyan(category.name),
            &format!("{} {}", category.description, s.dim(&format!("({})", category.sites.len()))),
        );
        if show_urls {
            for url in category.sites {
                eprintln!("      {}", s.dim(url));
            }
        }
    }
    let all = sites::category_urls("all").unwrap_or_default();
    output::print_row(
        &s.cyan("all"),
        &format!(
            "awwwards, agencies, ecommerce and portfolios {}",
            s.dim(&format!("({})", all.len()))
        ),
    );
    Ok(())
}
