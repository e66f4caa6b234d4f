mod common;

use actix_web::{test, App};
use sea_orm::EntityTrait;
use serde_json::Value;

use penpost::entity::post;

#[actix_rt::test]
async fn home_page_is_served_stale_until_cleared() {
    let env = common::test_env().await;
    let author = common::create_user(env.db.get_ref(), "writer").await;
    let target = common::create_post(env.db.get_ref(), author.id, "cached away", None).await;
    let app = test::init_service(App::new().configure(env.configure())).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page_obj"]["items"].as_array().unwrap().len(), 1);

    post::Entity::delete_by_id(target.id)
        .exec(env.db.get_ref())
        .await
        .unwrap();

    // still the cached copy
    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page_obj"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["page_obj"]["items"][0]["text"], "cached away");

    env.page_cache.clear().await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page_obj"]["items"].as_array().unwrap().len(), 0);
}

#[actix_rt::test]
async fn creating_a_post_does_not_invalidate_the_cache() {
    let env = common::test_env().await;
    let author = common::create_user(env.db.get_ref(), "writer").await;
    let app = test::init_service(App::new().configure(env.configure())).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page_obj"]["items"].as_array().unwrap().len(), 0);

    common::create_post(env.db.get_ref(), author.id, "too fresh", None).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page_obj"]["items"].as_array().unwrap().len(), 0);
}

#[actix_rt::test]
async fn each_query_string_gets_its_own_cache_entry() {
    let env = common::test_env().await;
    let author = common::create_user(env.db.get_ref(), "writer").await;
    let target = common::create_post(env.db.get_ref(), author.id, "only one", None).await;
    let app = test::init_service(App::new().configure(env.configure())).await;

    // prime the bare path only
    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page_obj"]["items"].as_array().unwrap().len(), 1);

    post::Entity::delete_by_id(target.id)
        .exec(env.db.get_ref())
        .await
        .unwrap();

    // a different query string misses the cache and sees the new state
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/?page=1").to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page_obj"]["items"].as_array().unwrap().len(), 0);

    // the bare path is still the stale copy
    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page_obj"]["items"].as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn group_and_profile_pages_are_never_cached() {
    let env = common::test_env().await;
    let author = common::create_user(env.db.get_ref(), "writer").await;
    let travel = common::create_group(env.db.get_ref(), "Travel", "travel").await;
    let target = common::create_post(env.db.get_ref(), author.id, "transient", Some(travel.id)).await;
    let app = test::init_service(App::new().configure(env.configure())).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/group/travel/").to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page_obj"]["items"].as_array().unwrap().len(), 1);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/profile/writer/").to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page_obj"]["items"].as_array().unwrap().len(), 1);

    post::Entity::delete_by_id(target.id)
        .exec(env.db.get_ref())
        .await
        .unwrap();

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/group/travel/").to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page_obj"]["items"].as_array().unwrap().len(), 0);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/profile/writer/").to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page_obj"]["items"].as_array().unwrap().len(), 0);
}
