//! Sort keys. An order predicate contributes no condition.

use sea_query::Order;

use crate::ast::SortDirection;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    direction: SortDirection,
}

impl OrderFilter {
    pub fn new(direction: SortDirection) -> Self {
        Self { direction }
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    pub fn order(&self) -> Order {
        match self.direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_direction() {
        assert!(matches!(OrderFilter::default().order(), Order::Asc));
        assert!(matches!(OrderFilter::new(SortDirection::Desc).order(), Order::Desc));
    }
}
