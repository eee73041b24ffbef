use crate::schema::RevenueCenter;

/// Margin dollars and percent for one revenue center. Total over finite
/// inputs: zero revenue yields a zero percent.
pub fn margin_for(center: &RevenueCenter) -> (f64, f64) {
    let margin_dollars = center.revenue
        - center.labor_cost
        - center.expense_cost
        - center.sga_allocation
        - center.data_allocation
        - center.workplace_allocation;

    let margin_percent = if center.revenue != 0.0 {
        margin_dollars / center.revenue * 100.0
    } else {
        0.0
    };

    (margin_dollars, margin_percent)
}

pub fn calculate_margins(centers: &mut [RevenueCenter]) {
    for center in centers.iter_mut() {
        let (dollars, percent) = margin_for(center);
        center.margin_dollars = dollars;
        center.margin_percent = percent;
    }
}
