use rocket::{
    futures::{Stream, StreamExt},
    response::stream::{Event, EventStream},
    serde::json::Json,
    Route, Shutdown, State,
};

use crate::error::{Error, Result};
use crate::model::{
    group::{CandidateId, CandidateMap, GroupId, GroupStore},
    search::{self, BusinessSearch, PriceTiers, SearchQuery},
    subscription::SubscriptionHub,
};
use crate::Config;

pub fn routes() -> Vec<Route> {
    routes![create_group, get_group, realtime, delete_group, vote]
}

/// Create a group from the open restaurants near `location`, up to the
/// `price` tier. Responds with the bare group ID.
#[post("/groups/create?<location>&<price>")]
pub async fn create_group(
    location: Option<String>,
    price: Option<String>,
    provider: &State<BusinessSearch>,
    store: &State<GroupStore>,
) -> Result<String> {
    let location = location
        .as_deref()
        .map(str::trim)
        .filter(|location| !location.is_empty())
        .ok_or_else(|| Error::bad_request("`location` is required"))?;
    let price = price
        .as_deref()
        .ok_or_else(|| Error::bad_request("`price` is required"))?
        .parse::<PriceTiers>()?;

    let query = SearchQuery::for_group(location, price);
    let mapped = search::map(provider.search(&query).await?);
    if mapped.candidates.is_empty() {
        return Err(Error::not_found(format!(
            "Open restaurants near '{location}'"
        )));
    }

    let gid = store.create(mapped.candidates).await?;
    Ok(gid.to_string())
}

#[get("/groups/<gid>")]
pub async fn get_group(gid: GroupId, store: &State<GroupStore>) -> Result<Json<CandidateMap>> {
    let candidates = store.get(&gid).await?;
    Ok(Json(candidates))
}

/// Server-sent events carrying the full candidate map: once on connection,
/// then after every change, until the group is deleted or the client leaves.
#[get("/groups/realtime/<gid>")]
pub async fn realtime(
    gid: GroupId,
    hub: &State<SubscriptionHub>,
    config: &State<Config>,
    shutdown: Shutdown,
) -> Result<EventStream<impl Stream<Item = Event>>> {
    // Rocket drops the stream when the client disconnects, which drops the
    // subscription and releases its listener.
    let subscription = hub.subscribe(&gid).await?;
    let events = subscription
        .map(|snapshot| Event::json(&snapshot))
        .take_until(shutdown);
    Ok(EventStream::from(events).heartbeat(config.heartbeat()))
}

#[delete("/groups/<gid>")]
pub async fn delete_group(gid: GroupId, store: &State<GroupStore>) -> Result<()> {
    store.delete(&gid).await
}

#[put("/groups/<gid>/<rid>")]
pub async fn vote(gid: GroupId, rid: CandidateId, store: &State<GroupStore>) -> Result<()> {
    store.vote(&gid, &rid).await?;
    Ok(())
}
