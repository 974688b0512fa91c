//! Data contracts of the intake form ("Ficha Inteligente de Atendimento
//! Previdenciário").
//!
//! Everything here is plain serde data so the same shapes can be read by the
//! browser engine in `ficha-frontend` and by any consumer of the persisted
//! envelope (the report generator reads `formData` directly).

pub mod shared;
