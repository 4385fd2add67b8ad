//! Population totals printed after a run.

use std::fmt;

use crate::model::BillTable;
use crate::pricing::PolicyKind;

/// Totals for one policy column.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyTotal {
    pub kind: PolicyKind,
    /// Sum of finite annual costs.
    pub total_cost: f64,
    /// Mean finite annual cost per building, 0 when none are finite.
    pub mean_cost: f64,
    /// Buildings whose cost is NaN or infinite.
    pub unpriced: usize,
}

/// Aggregate view of a bill table.
#[derive(Debug, Clone, PartialEq)]
pub struct BillSummary {
    pub buildings: usize,
    pub total_kwh: f64,
    pub policies: Vec<PolicyTotal>,
}

impl BillSummary {
    pub fn from_table(table: &BillTable) -> Self {
        let total_kwh = table.rows().iter().map(|r| r.annual_kwh).sum();
        let policies = table
            .policies()
            .iter()
            .enumerate()
            .map(|(col, &kind)| {
                let (finite, unpriced): (Vec<f64>, Vec<f64>) = table
                    .rows()
                    .iter()
                    .filter_map(|r| r.costs.get(col).copied())
                    .partition(|c| c.is_finite());
                let total_cost: f64 = finite.iter().sum();
                let mean_cost = if finite.is_empty() {
                    0.0
                } else {
                    total_cost / finite.len() as f64
                };
                PolicyTotal {
                    kind,
                    total_cost,
                    mean_cost,
                    unpriced: unpriced.len(),
                }
            })
            .collect();

        Self {
            buildings: table.len(),
            total_kwh,
            policies,
        }
    }
}

impl fmt::Display for BillSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Bill Summary ---")?;
        writeln!(f, "Buildings billed:      {}", self.buildings)?;
        write!(f, "Annual consumption:    {:.1} kWh", self.total_kwh)?;
        for p in &self.policies {
            write!(
                f,
                "\n{:<8} total ${:.2}, mean ${:.2}/building",
                p.kind.name(),
                p.total_cost,
                p.mean_cost
            )?;
            if p.unpriced > 0 {
                write!(f, " ({} unpriced)", p.unpriced)?;
            }
        }
        Ok(())
    }
}
