mod common;

use actix_web::http::header;
use actix_web::{test, App};
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::Value;

use penpost::entity::comment;

fn location(resp: &actix_web::dev::ServiceResponse) -> String {
    resp.headers()
        .get(header::LOCATION)
        .expect("Location header")
        .to_str()
        .unwrap()
        .to_string()
}

#[actix_rt::test]
async fn anonymous_comment_redirects_to_login() {
    let env = common::test_env().await;
    let author = common::create_user(env.db.get_ref(), "writer").await;
    let target = common::create_post(env.db.get_ref(), author.id, "a post", None).await;
    let app = test::init_service(App::new().configure(env.configure())).await;

    let uri = format!("/posts/{}/comment/", target.id);
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&uri)
            .set_form([("text", "drive-by")])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 302);
    assert_eq!(location(&resp), format!("/auth/login/?next={}", urlencoding::encode(&uri)));
    assert_eq!(
        comment::Entity::find().count(env.db.get_ref()).await.unwrap(),
        0
    );
}

#[actix_rt::test]
async fn comment_appears_on_detail_page() {
    let env = common::test_env().await;
    let author = common::create_user(env.db.get_ref(), "writer").await;
    let reader = common::create_user(env.db.get_ref(), "reader").await;
    let target = common::create_post(env.db.get_ref(), author.id, "a post", None).await;
    let cookie = common::login_cookie(&env, reader.id).await;
    let app = test::init_service(App::new().configure(env.configure())).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/posts/{}/comment/", target.id))
            .cookie(cookie)
            .set_form([("text", "well said")])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 302);
    assert_eq!(location(&resp), format!("/posts/{}/", target.id));

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/posts/{}/", target.id))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let comments = body["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["text"], "well said");
    assert_eq!(comments[0]["author"], "reader");
}

#[actix_rt::test]
async fn comments_are_listed_oldest_first() {
    let env = common::test_env().await;
    let author = common::create_user(env.db.get_ref(), "writer").await;
    let reader = common::create_user(env.db.get_ref(), "reader").await;
    let target = common::create_post(env.db.get_ref(), author.id, "a post", None).await;
    common::create_comment(env.db.get_ref(), target.id, reader.id, "first").await;
    common::create_comment(env.db.get_ref(), target.id, author.id, "second").await;
    common::create_comment(env.db.get_ref(), target.id, reader.id, "third").await;
    let app = test::init_service(App::new().configure(env.configure())).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/posts/{}/", target.id))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let comments = body["comments"].as_array().unwrap();
    assert_eq!(comments[0]["text"], "first");
    assert_eq!(comments[1]["text"], "second");
    assert_eq!(comments[2]["text"], "third");
}

#[actix_rt::test]
async fn blank_comment_rerenders_detail_with_error() {
    let env = common::test_env().await;
    let author = common::create_user(env.db.get_ref(), "writer").await;
    let reader = common::create_user(env.db.get_ref(), "reader").await;
    let target = common::create_post(env.db.get_ref(), author.id, "a post", None).await;
    let cookie = common::login_cookie(&env, reader.id).await;
    let app = test::init_service(App::new().configure(env.configure())).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/posts/{}/comment/", target.id))
            .cookie(cookie)
            .set_form([("text", "   ")])
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["post"]["text"], "a post");
    assert_eq!(
        body["form"]["errors"]["text"][0],
        "This field is required."
    );
    assert_eq!(
        comment::Entity::find().count(env.db.get_ref()).await.unwrap(),
        0
    );
}

#[actix_rt::test]
async fn commenting_on_missing_post_is_not_found() {
    let env = common::test_env().await;
    let reader = common::create_user(env.db.get_ref(), "reader").await;
    let cookie = common::login_cookie(&env, reader.id).await;
    let app = test::init_service(App::new().configure(env.configure())).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/posts/999/comment/")
            .cookie(cookie)
            .set_form([("text", "into the void")])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 404);
}
