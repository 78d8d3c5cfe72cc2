//! Utility macros for reducing boilerplate

/// Implement `FromRef<Governance>` so handlers can extract one service.
///
/// # Example
/// ```ignore
/// impl_from_ref!(Arc<ResponseCache>, cache);
/// // Expands to:
/// impl axum::extract::FromRef<Governance> for Arc<ResponseCache> {
///     fn from_ref(state: &Governance) -> Self {
///         state.cache.clone()
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::Governance> for $type {
            fn from_ref(state: &$crate::state::Governance) -> Self {
                state.$field.clone()
            }
        }
    };
}
