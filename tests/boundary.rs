use std::sync::Arc;

use chrono::Duration;
use foodgram_sdk::{
    export::ShoppingListExport,
    jwt::{sign_jwt_session, JwtSessionData, SessionData},
    middleware::{with_possible_session, with_session},
    schema::{ShoppingListRow, UserRole},
};
use warp::Filter;

const SECRET: &str = "boundary-secret";

fn token(user_id: i32, lifetime: Duration) -> String {
    let claims = JwtSessionData::new(user_id, format!("cook{user_id}"), UserRole::User, lifetime);
    sign_jwt_session(&claims, SECRET).ok().unwrap()
}

fn secret() -> Arc<str> {
    Arc::from(SECRET)
}

#[tokio::test]
async fn session_cookie_identifies_the_viewer() {
    let session = warp::test::request()
        .header("cookie", format!("session={}", token(7, Duration::hours(1))))
        .filter(&with_possible_session(secret()))
        .await
        .unwrap();

    assert_eq!(session.map(|s| s.user_id), Some(7));
}

#[tokio::test]
async fn bearer_header_identifies_the_viewer() {
    let session = warp::test::request()
        .header("authorization", format!("Bearer {}", token(9, Duration::hours(1))))
        .filter(&with_possible_session(secret()))
        .await
        .unwrap();

    assert_eq!(session.map(|s| s.user_id), Some(9));
}

#[tokio::test]
async fn missing_or_broken_tokens_are_anonymous() {
    let anonymous = warp::test::request()
        .filter(&with_possible_session(secret()))
        .await
        .unwrap();
    assert_eq!(anonymous, None);

    let expired = warp::test::request()
        .header("cookie", format!("session={}", token(7, Duration::hours(-1))))
        .filter(&with_possible_session(secret()))
        .await
        .unwrap();
    assert_eq!(expired, None);

    let forged = warp::test::request()
        .header("authorization", "Bearer not-a-token")
        .filter(&with_possible_session(secret()))
        .await
        .unwrap();
    assert_eq!(forged, None);
}

#[tokio::test]
async fn required_session_rejects_anonymous_viewers() {
    let rejected = warp::test::request()
        .filter(&with_session(secret()))
        .await;
    assert!(rejected.is_err());

    let session: SessionData = warp::test::request()
        .header("cookie", format!("session={}", token(3, Duration::hours(1))))
        .filter(&with_session(secret()))
        .await
        .unwrap();
    assert_eq!(session.username, "cook3");
}

fn row(name: &str, unit: &str, amount: i32) -> ShoppingListRow {
    ShoppingListRow {
        name: name.to_string(),
        measurement_unit: unit.to_string(),
        amount,
    }
}

#[tokio::test]
async fn export_is_served_as_a_csv_attachment() {
    let export = ShoppingListExport::consolidate(vec![
        row("Flour", "g", 200),
        row("Eggs", "pcs", 2),
        row("Flour", "g", 150),
    ]);
    let route = warp::any().map(move || export.clone());

    let response = warp::test::request().reply(&route).await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "text/csv; charset=utf-8");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"shopping_list.csv\""
    );
    assert_eq!(
        std::str::from_utf8(response.body()).unwrap(),
        "Ингредиент,Количество\r\nEggs,2\r\nFlour,350\r\n"
    );
}

#[tokio::test]
async fn empty_export_is_header_only() {
    let route = warp::any().map(|| ShoppingListExport::consolidate(vec![]));

    let response = warp::test::request().reply(&route).await;

    assert_eq!(
        std::str::from_utf8(response.body()).unwrap(),
        "Ингредиент,Количество\r\n"
    );
}
