use log::debug;
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::Header,
    Request, Response, Route,
};

use crate::Config;

const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Cache-Control, Last-Event-ID";

pub fn routes() -> Vec<Route> {
    routes![preflight]
}

/// Answers CORS preflight requests for every path. The headers themselves are
/// added by [`CorsFairing`].
#[options("/<_..>")]
fn preflight() {}

/// A fairing that grants cross-origin access to the configured origins.
/// Responses to any other origin carry no CORS headers.
pub struct CorsFairing;

#[rocket::async_trait]
impl Fairing for CorsFairing {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let Some(origin) = req.headers().get_one("Origin") else {
            return;
        };
        let allowed = req
            .rocket()
            .state::<Config>()
            .map_or(false, |config| config.is_allowed_origin(origin));
        if !allowed {
            debug!("Refusing cross-origin request from {origin}");
            return;
        }

        res.set_header(Header::new("Access-Control-Allow-Origin", origin.to_string()));
        res.set_header(Header::new("Access-Control-Allow-Methods", ALLOWED_METHODS));
        res.set_header(Header::new("Access-Control-Allow-Headers", ALLOWED_HEADERS));
        res.set_header(Header::new("Vary", "Origin"));
    }
}
