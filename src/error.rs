use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    /// The cache store, worker pool or a dataset could not be set up.
    #[display("could not start")]
    Setup,
    #[display("no dataset named {_0:?} is configured")]
    UnknownDataset(#[error(not(source))] String),
    #[display("lookup failed")]
    Lookup,
    #[display("could not write output")]
    Output,
}
