/// Startup options supplied by the embedding application. They take
/// precedence over configuration files and environment variables.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Config filename
    pub cfg_name: Option<String>,

    /// Size of the exception delivery pool
    pub exception_max_threads: Option<usize>,
}
