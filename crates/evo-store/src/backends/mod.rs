//! Storage backend implementations.

mod local;
mod supabase;

pub use local::LocalStore;
pub use supabase::SupabaseStore;

/// Names accepted for the `storage.backend` setting.
pub fn available() -> &'static [&'static str] {
    &["supabase", "local"]
}
