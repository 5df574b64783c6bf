
/// Row-level dependency hooks around the search of one layer.
///
/// `wait` is called before a block row of `layer` is searched and `signal`
/// once its results are in the bank, so an external scheduler can gate rows
/// on reference availability or publish progress to later frames.
pub trait RowSync: Send + Sync {
    fn wait(&self, layer: usize, row: usize);

    fn signal(&self, layer: usize, row: usize);
}

/// Synchronization for a single-threaded caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSync;

impl RowSync for NoopSync {
    fn wait(&self, _layer: usize, _row: usize) {}

    fn signal(&self, _layer: usize, _row: usize) {}
}
