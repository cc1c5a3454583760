use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("order_uid is empty")]
    EmptyOrderUid,

    #[error("order {0} has no items")]
    NoItems(String),

    #[error("order {order_uid} has incomplete delivery (name: {name:?}, phone: {phone:?})")]
    IncompleteDelivery {
        order_uid: String,
        name: String,
        phone: String,
    },

    #[error("order {order_uid} has negative payment amount ({amount})")]
    NegativeAmount { order_uid: String, amount: i64 },
}
