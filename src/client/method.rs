//! Request methods and URL schemes known to the client.

use std::fmt;
use std::str::FromStr;

/// HTTP methods, plus `POST_FORM` for url-encoded form posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestMethod {
    Get,
    Post,
    PostForm,
    Head,
    Connect,
    Delete,
    Options,
    Patch,
    Put,
    Trace,
}

impl RestMethod {
    pub const ALL: [RestMethod; 10] = [
        RestMethod::Get,
        RestMethod::Post,
        RestMethod::PostForm,
        RestMethod::Head,
        RestMethod::Connect,
        RestMethod::Delete,
        RestMethod::Options,
        RestMethod::Patch,
        RestMethod::Put,
        RestMethod::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RestMethod::Get => "GET",
            RestMethod::Post => "POST",
            RestMethod::PostForm => "POST_FORM",
            RestMethod::Head => "HEAD",
            RestMethod::Connect => "CONNECT",
            RestMethod::Delete => "DELETE",
            RestMethod::Options => "OPTIONS",
            RestMethod::Patch => "PATCH",
            RestMethod::Put => "PUT",
            RestMethod::Trace => "TRACE",
        }
    }

    /// Whether `RestClient::request` can send this method.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            RestMethod::Get | RestMethod::Post | RestMethod::PostForm | RestMethod::Head
        )
    }
}

impl fmt::Display for RestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| format!("unknown method: {s}"))
    }
}

/// URL scheme of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RestProtocol {
    Http,
    #[default]
    Https,
    Ws,
}

impl RestProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestProtocol::Http => "http",
            RestProtocol::Https => "https",
            RestProtocol::Ws => "ws",
        }
    }
}

impl fmt::Display for RestProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(RestProtocol::Http),
            "https" => Ok(RestProtocol::Https),
            "ws" => Ok(RestProtocol::Ws),
            other => Err(format!("unknown protocol: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(RestMethod::PostForm.to_string(), "POST_FORM");
        assert_eq!("post-form".parse::<RestMethod>().unwrap(), RestMethod::PostForm);
        assert_eq!("trace".parse::<RestMethod>().unwrap(), RestMethod::Trace);
        assert!("FETCH".parse::<RestMethod>().is_err());
    }

    #[test]
    fn test_supported_methods() {
        let supported: Vec<_> = RestMethod::ALL.into_iter().filter(RestMethod::is_supported).collect();
        assert_eq!(
            supported,
            vec![RestMethod::Get, RestMethod::Post, RestMethod::PostForm, RestMethod::Head]
        );
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!("HTTPS".parse::<RestProtocol>().unwrap(), RestProtocol::Https);
        assert_eq!(RestProtocol::Ws.to_string(), "ws");
        assert!("ftp".parse::<RestProtocol>().is_err());
    }
}
