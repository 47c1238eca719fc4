use rocket::Route;

mod groups;

pub fn routes() -> Vec<Route> {
    groups::routes()
}
