use rocket::Route;

mod auth;
mod ballot;
mod session;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(session::routes());
    routes.extend(auth::routes());
    routes.extend(ballot::routes());
    routes
}
