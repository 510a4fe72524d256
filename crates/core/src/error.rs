#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Illegal {entity} status transition: {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
}
