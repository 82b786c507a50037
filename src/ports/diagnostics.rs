/// Receives raw page markup when extraction cannot locate what it expected.
///
/// Writes are fire-and-forget: implementations log their own failures.
pub trait DiagnosticsSink: Send + Sync {
    fn dump(&self, label: &str, body: &str);
}
