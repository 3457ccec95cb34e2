//! Synthetic Beneficiaries and Gifts used for dry runs.

use crate::constants::*;
use crate::table::{Record, Table};

pub fn sample_beneficiaries() -> Table {
    let rows = [("B001", "  Alice  ", "active"), ("B002", "Bob", "inactive"), ("B003", "Charlie", "active")];
    Table::from_records(
        rows.iter()
            .map(|(id, name, status)| {
                Record::new()
                    .with(BENEFICIARY_JOIN_KEY, *id)
                    .with(BENEFICIARY_NAME, *name)
                    .with(BENEFICIARY_STATUS, *status)
            })
            .collect(),
    )
}

pub fn sample_gifts() -> Table {
    let rows = [
        ("B001", "G001", "Cash", 500.0, "2024-01-15"),
        ("B002", "G002", "In-Kind", 200.0, "2024-02-20"),
        ("B003", "G003", "Cash", 150.0, "2024-03-05"),
    ];
    Table::from_records(
        rows.iter()
            .map(|(beneficiary, id, kind, amount, date)| {
                Record::new()
                    .with(BENEFICIARY_JOIN_KEY, *beneficiary)
                    .with(GIFT_ID, *id)
                    .with(GIFT_TYPE, *kind)
                    .with(GIFT_AMOUNT, *amount)
                    .with(GIFT_DATE, *date)
            })
            .collect(),
    )
}
