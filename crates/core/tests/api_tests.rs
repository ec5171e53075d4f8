//! Library API integration tests
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use picgrab_core::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn get_site_fixture_path(site: &str, name: &str) -> String {
    format!("../../tests/fixtures/sites/{}/{}", site, name)
}

fn bundled_resolver() -> Resolver {
    let registry = Arc::new(ConfigLoader::new().load_registry().expect("bundled domains load"));
    let config = ResolverConfig::builder().pictures_root("/pictures").build();
    Resolver::new(registry, config).expect("client builds")
}

#[test]
fn test_resolve_dilbert_strip() {
    let html = fs::read_to_string(get_site_fixture_path("dilbert", "strip-2011-03-24.html")).unwrap();
    let images = bundled_resolver().resolve_markup("http://dilbert.com/strip/2011-03-24", &html);

    assert_eq!(images.len(), 1);
    assert_eq!(images[0].image_url, "http://assets.amuniversal.com/64a5e1b036e9012ea5cb00163e41dd5b");
    assert_eq!(images[0].file_name, "2011-03-24");
    assert_eq!(images[0].target_path, PathBuf::from("/pictures/picgrab/dilbert.com/2011-03-24"));
}

#[test]
fn test_resolve_schisslaweng_gallery() {
    let html = fs::read_to_string(get_site_fixture_path("schisslaweng", "probe.html")).unwrap();
    let images = bundled_resolver().resolve_markup("https://www.schisslaweng.net/probe/", &html);

    let names: Vec<&str> = images.iter().map(|image| image.file_name.as_str()).collect();
    assert_eq!(names, ["2017-03-29_-_Probe1.jpg", "2017-03-29_-_Probe2.jpg", "2017-03-29_-_Probe3.jpg"]);
    assert_eq!(
        images[1].image_url,
        "https://www.schisslaweng.net/wp-content/uploads/2017/03/probe-02-1024x683.jpg"
    );
    assert!(images.iter().all(|image| image.target_path.starts_with("/pictures/picgrab/Schisslaweng")));
}

#[test]
fn test_resolve_xkcd_comic() {
    let html = fs::read_to_string(get_site_fixture_path("xkcd", "1513.html")).unwrap();
    let images = bundled_resolver().resolve_markup("https://xkcd.com/1513/", &html);

    assert_eq!(images.len(), 1);
    assert_eq!(images[0].image_url, "https://imgs.xkcd.com/comics/code_quality.png");
    assert_eq!(images[0].file_name, "1513_-_Code_Quality.png");
}

#[test]
fn test_fixture_against_wrong_site_is_empty() {
    let html = fs::read_to_string(get_site_fixture_path("xkcd", "1513.html")).unwrap();
    let resolver = bundled_resolver();

    assert!(resolver.resolve_markup("https://www.schisslaweng.net/probe/", &html).is_empty());
    assert!(resolver.resolve_markup("https://example.com/1513/", &html).is_empty());
}

#[test]
fn test_match_bundled_domains() {
    let resolver = bundled_resolver();

    assert_eq!(resolver.match_url("https://xkcd.com/1513/").map(|d| d.name), Some("xkcd.com".to_string()));
    assert_eq!(
        resolver.match_url("http://dilbert.com/strip/2011-03-24").map(|d| d.name),
        Some("dilbert.com".to_string())
    );
    assert!(resolver.match_url("https://xkcd.com/archive/").is_none());
    assert!(resolver.match_url("not a url").is_none());
}

#[test]
fn test_custom_download_directory_is_used() {
    let config_dir = TempDir::new().unwrap();
    fs::write(
        config_dir.path().join("download_directories.json"),
        r#"[{ "name": "xkcd.com", "directory": "/comics/xkcd", "isPathRelative": false }]"#,
    )
    .unwrap();

    let registry = ConfigLoader::builder().custom_dir(config_dir.path()).build().load_registry().unwrap();
    let resolver = Resolver::new(Arc::new(registry), ResolverConfig::default()).unwrap();
    let html = fs::read_to_string(get_site_fixture_path("xkcd", "1513.html")).unwrap();
    let images = resolver.resolve_markup("https://xkcd.com/1513/", &html);

    assert_eq!(images[0].target_path, PathBuf::from("/comics/xkcd/1513_-_Code_Quality.png"));
}

fn mock_site_config(server: &MockServer, config_dir: &TempDir) {
    let host_pattern = format!("^{}$", regex::escape(&server.uri()));
    let domains = serde_json::json!([{
        "name": "Mock Comics",
        "url": host_pattern,
        "path": "^/comic/(\\d+)$",
        "images": [{ "type": "Attribute", "selector": "#strip img", "attributeName": "src" }],
        "fileNameFragments": [
            { "type": "Url", "pattern": "^/comic/(\\d+)$", "replace": "$1" },
            { "type": "Text", "selector": "h1" }
        ],
        "fileNameFragmentDelimiter": "_-_",
        "defaultFileEnding": ".png"
    }]);
    fs::write(config_dir.path().join("domains.json"), domains.to_string()).unwrap();
}

#[tokio::test]
async fn test_resolve_and_save_over_http() {
    let server = MockServer::start().await;
    let page = format!(
        r#"<html><body><h1>Über Tage</h1><div id="strip"><img src="{0}/img/7a.png"><img src="{0}/img/7b"></div></body></html>"#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/comic/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/7a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"first".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/7b"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"second".to_vec()))
        .mount(&server)
        .await;

    let config_dir = TempDir::new().unwrap();
    let pictures = TempDir::new().unwrap();
    mock_site_config(&server, &config_dir);

    let registry = ConfigLoader::builder().custom_dir(config_dir.path()).build().load_registry().unwrap();
    let config = ResolverConfig::builder().timeout(5).pictures_root(pictures.path()).build();
    let resolver = Resolver::new(Arc::new(registry), config).unwrap();

    let images = resolver.resolve(&format!("{}/comic/7", server.uri())).await;
    let names: Vec<&str> = images.iter().map(|image| image.file_name.as_str()).collect();
    assert_eq!(names, ["7_-_Ueber_Tage1.png", "7_-_Ueber_Tage2.png"]);

    let saved = save_all(resolver.fetcher(), &images).await;
    let directory = pictures.path().join("picgrab").join("Mock Comics");
    assert!(saved.iter().all(|result| result.is_ok()));
    assert_eq!(fs::read(directory.join("7_-_Ueber_Tage1.png")).unwrap(), b"first");
    assert_eq!(fs::read(directory.join("7_-_Ueber_Tage2.png")).unwrap(), b"second");
}

#[tokio::test]
async fn test_resolve_unreachable_page_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config_dir = TempDir::new().unwrap();
    mock_site_config(&server, &config_dir);
    let registry = ConfigLoader::builder().custom_dir(config_dir.path()).build().load_registry().unwrap();
    let resolver = Resolver::new(Arc::new(registry), ResolverConfig::default()).unwrap();
    let url = format!("{}/comic/8", server.uri());

    assert!(resolver.match_url(&url).is_some());
    assert!(resolver.resolve(&url).await.is_empty());
}

#[test]
fn test_reload_picks_up_new_domain() {
    let config_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::builder().custom_dir(config_dir.path()).build();
    let registry = loader.load_registry().unwrap();
    let before = registry.len();

    fs::write(
        config_dir.path().join("domains.json"),
        r#"[{ "name": "example", "url": "^https://example\\.com$", "path": "^/.*$",
             "images": [{ "type": "Attribute", "selector": "img", "attributeName": "src" }] }]"#,
    )
    .unwrap();
    loader.reload(&registry).unwrap();

    assert_eq!(registry.len(), before + 1);
    assert_eq!(registry.match_url("https://example.com/a").map(|d| d.name), Some("example".to_string()));
}
