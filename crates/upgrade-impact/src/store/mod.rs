pub mod database;
pub mod ledger;
pub mod schema;
pub mod totals;
