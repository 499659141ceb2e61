use hopline_wire::FailureKind;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid redirect: {message}")]
    InvalidRedirect { message: String },
}

impl From<Error> for hopline_wire::Error {
    fn from(error: Error) -> Self {
        hopline_wire::Error::transport(FailureKind::Connection, error.to_string())
    }
}
