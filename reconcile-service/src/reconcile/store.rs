use std::collections::BTreeMap;

use time::OffsetDateTime;
use usage_model::{Channel, EpochTotals, Flow, RegisterReading, RowPricing, UsageRow};

/// Bucket-keyed rows shared by every reconciler in a run.
///
/// Rows are created on first contribution and only ever enriched. Each
/// `record_*` method writes the fields owned by one source; pricing can be
/// applied once per row.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UsageRowStore {
    rows: BTreeMap<OffsetDateTime, UsageRow>,
}

impl UsageRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, bucket: OffsetDateTime) -> Option<&UsageRow> {
        self.rows.get(&bucket)
    }

    pub fn rows(&self) -> impl Iterator<Item = &UsageRow> {
        self.rows.values()
    }

    fn row_mut(&mut self, bucket: OffsetDateTime) -> &mut UsageRow {
        self.rows.entry(bucket).or_insert_with(|| UsageRow::new(bucket))
    }

    /// Last value wins.
    pub fn record_interval(&mut self, bucket: OffsetDateTime, flow: Flow, kwh: f64) {
        self.row_mut(bucket).intervals.insert(flow, kwh);
    }

    pub fn record_epoch(&mut self, bucket: OffsetDateTime, channel: Channel, totals: EpochTotals) {
        self.row_mut(bucket).epochs.insert(channel, totals);
    }

    pub fn record_register(&mut self, bucket: OffsetDateTime, flow: Flow, reading: RegisterReading) {
        self.row_mut(bucket).registers.insert(flow, reading);
    }

    /// Applies pricing to every row; `price` is called once per row in bucket order.
    ///
    /// Rows that already carry pricing are left untouched and counted in the
    /// returned value.
    pub fn price_rows<F>(&mut self, mut price: F) -> usize
    where
        F: FnMut(&UsageRow) -> RowPricing,
    {
        let mut already_priced = 0;
        for row in self.rows.values_mut() {
            if row.pricing.is_some() {
                already_priced += 1;
                continue;
            }
            let pricing = price(row);
            row.pricing = Some(pricing);
        }
        already_priced
    }

    /// Rows ascending by bucket.
    pub fn into_rows(self) -> Vec<UsageRow> {
        self.rows.into_values().collect()
    }
}
