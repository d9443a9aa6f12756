/// Query access to a view.
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of entries, or 0 while the view is being written.
    fn count(&self) -> usize;
}
