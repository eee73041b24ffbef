//! Overhead pool derivation and pro-rata distribution by revenue.
//!
//! Each pool has a cohort of eligible revenue centers: every revenue center
//! for SG&A, `Data`-tagged ones for the data pool and `Wellness`-tagged ones
//! for the workplace pool. Members share the pool in proportion to revenue;
//! non-members always receive zero. A cohort with no positive revenue leaves
//! the pool unallocated, which the validator reports as a reconciliation
//! failure when the pool itself is non-zero.

use crate::error::{ReconciliationError, Result};
use crate::schema::{AllocationTag, Bucket, CostCenter, LedgerAccount, OverheadPools, RevenueCenter};
use crate::tagging::bucket_total;
use crate::utils::{format_money, within_tolerance};
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Sga,
    Data,
    Workplace,
}

impl Pool {
    pub const ALL: [Pool; 3] = [Pool::Sga, Pool::Data, Pool::Workplace];

    pub fn label(&self) -> &'static str {
        match self {
            Pool::Sga => "SG&A",
            Pool::Data => "Data Infrastructure",
            Pool::Workplace => "Workplace Well-being",
        }
    }

    pub fn is_eligible(&self, center: &RevenueCenter) -> bool {
        match self {
            Pool::Sga => true,
            Pool::Data => center.allocation_tag == Some(AllocationTag::Data),
            Pool::Workplace => center.allocation_tag == Some(AllocationTag::Wellness),
        }
    }

    pub fn total(&self, pools: &OverheadPools) -> f64 {
        match self {
            Pool::Sga => pools.sga_pool,
            Pool::Data => pools.data_pool,
            Pool::Workplace => pools.workplace_pool,
        }
    }

    pub fn allocation(&self, center: &RevenueCenter) -> f64 {
        match self {
            Pool::Sga => center.sga_allocation,
            Pool::Data => center.data_allocation,
            Pool::Workplace => center.workplace_allocation,
        }
    }

    fn allocation_mut<'a>(&self, center: &'a mut RevenueCenter) -> &'a mut f64 {
        match self {
            Pool::Sga => &mut center.sga_allocation,
            Pool::Data => &mut center.data_allocation,
            Pool::Workplace => &mut center.workplace_allocation,
        }
    }

    /// Sum of this pool's allocation column.
    pub fn allocated(&self, centers: &[RevenueCenter]) -> f64 {
        centers.iter().map(|c| self.allocation(c)).sum()
    }

    /// Revenue of the eligible cohort.
    pub fn cohort_revenue(&self, centers: &[RevenueCenter]) -> f64 {
        centers
            .iter()
            .filter(|c| self.is_eligible(c))
            .map(|c| c.revenue)
            .sum()
    }
}

pub struct OverheadAllocator {
    tolerance: f64,
}

impl OverheadAllocator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Pool totals from the tagged ledger, optionally topped up with cost
    /// center spend labelled `SGA` or `DATA`. Cost centers never feed the
    /// workplace pool.
    pub fn calculate_pools(
        &self,
        ledger: &[LedgerAccount],
        cost_centers: &[CostCenter],
        include_cost_centers: bool,
    ) -> OverheadPools {
        let (mut sga_pool, _) = bucket_total(ledger, Bucket::Sga);
        let (mut data_pool, _) = bucket_total(ledger, Bucket::Data);
        let (workplace_pool, _) = bucket_total(ledger, Bucket::Workplace);

        if include_cost_centers {
            let spend = |pool| -> f64 {
                cost_centers
                    .iter()
                    .filter(|c| c.pool == pool)
                    .map(|c| c.total_cost)
                    .sum()
            };
            let sga_cc = spend(Bucket::Sga);
            let data_cc = spend(Bucket::Data);
            debug!(
                "Cost center overhead: {} into SG&A, {} into Data",
                format_money(sga_cc),
                format_money(data_cc)
            );
            sga_pool += sga_cc;
            data_pool += data_cc;
        }

        let pools = OverheadPools {
            sga_pool,
            data_pool,
            workplace_pool,
        };
        info!(
            "Overhead pools: SG&A {}, Data {}, Workplace {}",
            format_money(pools.sga_pool),
            format_money(pools.data_pool),
            format_money(pools.workplace_pool)
        );
        pools
    }

    /// Distributes one pool over its cohort and checks the column sum.
    pub fn allocate(&self, centers: &mut [RevenueCenter], pool: Pool, pool_total: f64) -> Result<()> {
        let cohort_revenue = pool.cohort_revenue(centers);

        for center in centers.iter_mut() {
            *pool.allocation_mut(center) = 0.0;
        }

        if cohort_revenue <= 0.0 {
            if pool_total != 0.0 {
                warn!(
                    "{} pool of {} has no eligible revenue and stays unallocated",
                    pool.label(),
                    format_money(pool_total)
                );
            }
            return Ok(());
        }

        for center in centers.iter_mut().filter(|c| pool.is_eligible(c)) {
            let share = center.revenue / cohort_revenue * pool_total;
            *pool.allocation_mut(center) = share;
        }

        self.check_reconciliation(pool, pool.allocated(centers), pool_total)
    }

    pub fn allocate_all(&self, centers: &mut [RevenueCenter], pools: &OverheadPools) -> Result<()> {
        for pool in Pool::ALL {
            self.allocate(centers, pool, pool.total(pools))?;
        }
        Ok(())
    }

    pub fn check_reconciliation(&self, pool: Pool, allocated: f64, pool_total: f64) -> Result<()> {
        if within_tolerance(allocated, pool_total, self.tolerance) {
            return Ok(());
        }
        Err(ReconciliationError::AllocationMismatch {
            pool: pool.label().to_string(),
            allocated,
            pool_total,
            difference: allocated - pool_total,
        })
    }
}
