use std::collections::BTreeSet;

use tabled::builder::Builder;
use tabled::{settings::Style, Table, Tabled};

use crate::types::{Context, Predicate};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Predicate")]
    pub predicate: String,
    #[tabled(rename = "Facts")]
    pub facts: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, predicate: &str, facts: &str) {
        self.rows.push(TableRow {
            predicate: predicate.to_string(),
            facts: facts.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stats_table(counts: &[(String, usize)]) -> String {
    let mut builder = TableBuilder::new();
    for (predicate, facts) in counts {
        builder.add_row(predicate, &facts.to_string());
    }
    builder.build()
}

pub fn predicates_table(predicates: &[Predicate]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Predicate", "Arity", "Signature"]);
    for predicate in predicates {
        builder.push_record([
            predicate.name.clone(),
            predicate.arity().to_string(),
            predicate.to_string(),
        ]);
    }
    builder.build().with(Style::rounded()).to_string()
}

/// One column per variable (union over all contexts), one row per context
pub fn contexts_table(contexts: &[Context]) -> String {
    let variables: BTreeSet<&str> = contexts
        .iter()
        .flat_map(|c| c.iter().map(|(name, _)| name.as_str()))
        .collect();

    let mut builder = Builder::default();
    builder.push_record(variables.iter().map(|v| format!("?{}", v)));
    for context in contexts {
        builder.push_record(
            variables
                .iter()
                .map(|v| context.get(v).map(|value| value.to_string()).unwrap_or_default()),
        );
    }
    builder.build().with(Style::rounded()).to_string()
}
