use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use url::Url;

use crate::{
    shop_models::{Category, Order, Product, ShopEntity},
    shop_repository::{RepositoryBackend, RepositoryError, ShopRepository},
    REST_REQUEST_TIMEOUT_SECS,
};

const API_KEY_HEADER: &str = "apikey";
const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// Network backend talking to the shop's REST API.
pub struct RestShopRepository {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl RestShopRepository {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Result<Self, RepositoryError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REST_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|source| RepositoryError::Http {
                url: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: with_trailing_slash(base_url),
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn endpoint(
        &self,
        collection: &'static str,
        id: Option<i64>,
    ) -> Result<Url, RepositoryError> {
        let relative = match id {
            Some(id) => format!("{collection}/{id}"),
            None => collection.to_string(),
        };
        self.base_url
            .join(&relative)
            .map_err(|error| RepositoryError::InvalidEndpoint {
                collection,
                reason: error.to_string(),
            })
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, RepositoryError> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| RepositoryError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            target: "repository",
            url = %url,
            status = status.as_u16(),
            "shop API request failed"
        );
        Err(RepositoryError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect(),
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: Response,
        url: &Url,
    ) -> Result<T, RepositoryError> {
        response.json().await.map_err(|source| RepositoryError::Http {
            url: url.to_string(),
            source,
        })
    }

    async fn list<T: ShopEntity>(&self) -> Result<Vec<T>, RepositoryError> {
        let url = self.endpoint(T::COLLECTION, None)?;
        let response = self.send(self.http.get(url.clone()), &url).await?;
        Self::decode(response, &url).await
    }

    async fn fetch<T: ShopEntity>(&self, id: i64) -> Result<Option<T>, RepositoryError> {
        let url = self.endpoint(T::COLLECTION, Some(id))?;
        match self.send(self.http.get(url.clone()), &url).await {
            Ok(response) => Self::decode(response, &url).await.map(Some),
            Err(RepositoryError::Status { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn save<T: ShopEntity>(&self, entity: T) -> Result<T, RepositoryError> {
        let (url, request) = if entity.id() == 0 {
            let url = self.endpoint(T::COLLECTION, None)?;
            let request = self.http.post(url.clone());
            (url, request)
        } else {
            let url = self.endpoint(T::COLLECTION, Some(entity.id()))?;
            let request = self.http.put(url.clone());
            (url, request)
        };

        let response = self.send(request.json(&entity), &url).await?;
        Self::decode(response, &url).await
    }

    async fn remove<T: ShopEntity>(&self, id: i64) -> Result<(), RepositoryError> {
        let url = self.endpoint(T::COLLECTION, Some(id))?;
        match self.send(self.http.delete(url.clone()), &url).await {
            Ok(_) => Ok(()),
            Err(RepositoryError::Status { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Err(RepositoryError::NotFound {
                    collection: T::COLLECTION,
                    id,
                })
            }
            Err(error) => Err(error),
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl ShopRepository for RestShopRepository {
    fn backend(&self) -> RepositoryBackend {
        RepositoryBackend::Remote
    }

    async fn products(&self) -> Result<Vec<Product>, RepositoryError> {
        self.list().await
    }

    async fn product(&self, id: i64) -> Result<Option<Product>, RepositoryError> {
        self.fetch(id).await
    }

    async fn save_product(&self, product: Product) -> Result<Product, RepositoryError> {
        self.save(product).await
    }

    async fn delete_product(&self, id: i64) -> Result<(), RepositoryError> {
        self.remove::<Product>(id).await
    }

    async fn categories(&self) -> Result<Vec<Category>, RepositoryError> {
        self.list().await
    }

    async fn category(&self, id: i64) -> Result<Option<Category>, RepositoryError> {
        self.fetch(id).await
    }

    async fn save_category(&self, category: Category) -> Result<Category, RepositoryError> {
        self.save(category).await
    }

    async fn delete_category(&self, id: i64) -> Result<(), RepositoryError> {
        self.remove::<Category>(id).await
    }

    async fn orders(&self) -> Result<Vec<Order>, RepositoryError> {
        self.list().await
    }

    async fn order(&self, id: i64) -> Result<Option<Order>, RepositoryError> {
        self.fetch(id).await
    }

    async fn save_order(&self, order: Order) -> Result<Order, RepositoryError> {
        self.save(order).await
    }

    async fn delete_order(&self, id: i64) -> Result<(), RepositoryError> {
        self.remove::<Order>(id).await
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    use super::*;

    #[derive(Debug)]
    struct CapturedRequest {
        method: String,
        path: String,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl CapturedRequest {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(header, _)| header == name)
                .map(|(_, value)| value.as_str())
        }
    }

    /// Accepts one connection on a loopback port, records the request and
    /// answers it with `status` and `body`.
    async fn answer_once(status: u16, body: String) -> (Url, JoinHandle<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let address = listener.local_addr().expect("local addr");

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buffer = Vec::new();
            let mut chunk = [0_u8; 1024];
            let head_len = loop {
                let read = stream.read(&mut chunk).await.expect("read request");
                assert!(read > 0, "connection closed before headers ended");
                buffer.extend_from_slice(&chunk[..read]);
                if let Some(end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
                    break end + 4;
                }
            };

            let head = String::from_utf8_lossy(&buffer[..head_len]).to_string();
            let mut lines = head.split("\r\n");
            let mut request_line = lines.next().unwrap_or_default().split(' ');
            let method = request_line.next().unwrap_or_default().to_string();
            let path = request_line.next().unwrap_or_default().to_string();
            let headers: Vec<(String, String)> = lines
                .filter_map(|line| line.split_once(':'))
                .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
                .collect();
            let content_length = headers
                .iter()
                .find(|(name, _)| name == "content-length")
                .and_then(|(_, value)| value.parse::<usize>().ok())
                .unwrap_or(0);
            while buffer.len() < head_len + content_length {
                let read = stream.read(&mut chunk).await.expect("read body");
                assert!(read > 0, "connection closed before body ended");
                buffer.extend_from_slice(&chunk[..read]);
            }
            let request_body =
                String::from_utf8_lossy(&buffer[head_len..head_len + content_length]).to_string();

            let response = format!(
                "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .await
                .expect("write response");
            let _ = stream.shutdown().await;

            CapturedRequest {
                method,
                path,
                headers,
                body: request_body,
            }
        });

        let base_url = Url::parse(&format!("http://{address}/api")).expect("stub url");
        (base_url, server)
    }

    fn stored_book(id: i64) -> Product {
        Product {
            id,
            name: "Dune".to_string(),
            price: 12.5,
            quantity: 4,
            ..Product::default()
        }
    }

    fn repository(base: &str) -> RestShopRepository {
        RestShopRepository::new(Url::parse(base).expect("valid url"), "secret")
            .expect("client should build")
    }

    #[test]
    fn new_appends_trailing_slash_so_endpoints_nest_under_base_path() {
        let repository = repository("https://shop.example/api");
        assert_eq!(repository.base_url().as_str(), "https://shop.example/api/");
        assert_eq!(
            repository
                .endpoint(Product::COLLECTION, None)
                .expect("endpoint")
                .as_str(),
            "https://shop.example/api/products"
        );
    }

    #[test]
    fn endpoint_appends_entity_id() {
        let repository = repository("https://shop.example/");
        assert_eq!(
            repository
                .endpoint(Order::COLLECTION, Some(42))
                .expect("endpoint")
                .as_str(),
            "https://shop.example/orders/42"
        );
    }

    #[test]
    fn backend_reports_remote() {
        assert_eq!(
            repository("http://127.0.0.1:5000").backend(),
            RepositoryBackend::Remote
        );
    }

    #[tokio::test]
    async fn fetch_sends_api_key_and_maps_not_found_to_none() {
        let (base_url, server) = answer_once(404, "{}".to_string()).await;
        let repository = RestShopRepository::new(base_url, "secret").expect("client");

        let product = repository.product(7).await.expect("404 is not an error");

        assert_eq!(product, None);
        let request = server.await.expect("server task");
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/api/products/7");
        assert_eq!(request.header(API_KEY_HEADER), Some("secret"));
    }

    #[tokio::test]
    async fn fetch_decodes_existing_entity() {
        let body = serde_json::to_string(&stored_book(3)).expect("encode");
        let (base_url, server) = answer_once(200, body).await;
        let repository = RestShopRepository::new(base_url, "secret").expect("client");

        assert_eq!(
            repository.product(3).await.expect("fetch"),
            Some(stored_book(3))
        );
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn server_error_becomes_status_error() {
        let (base_url, server) = answer_once(500, "database is down".to_string()).await;
        let repository = RestShopRepository::new(base_url, "secret").expect("client");

        let error = repository.categories().await.expect_err("500 must fail");

        match error {
            RepositoryError::Status { status, body, url } => {
                assert_eq!(status, 500);
                assert_eq!(body, "database is down");
                assert!(url.ends_with("/api/categories"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn save_of_new_entity_posts_to_collection() {
        let body = serde_json::to_string(&stored_book(5)).expect("encode");
        let (base_url, server) = answer_once(201, body).await;
        let repository = RestShopRepository::new(base_url, "secret").expect("client");

        let saved = repository
            .save_product(stored_book(0))
            .await
            .expect("save");

        assert_eq!(saved.id, 5);
        let request = server.await.expect("server task");
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/api/products");
        assert_eq!(request.header(API_KEY_HEADER), Some("secret"));
        let sent: Product = serde_json::from_str(&request.body).expect("json body");
        assert_eq!(sent, stored_book(0));
    }

    #[tokio::test]
    async fn save_of_existing_entity_puts_to_its_id() {
        let body = serde_json::to_string(&stored_book(3)).expect("encode");
        let (base_url, server) = answer_once(200, body).await;
        let repository = RestShopRepository::new(base_url, "secret").expect("client");

        repository
            .save_product(stored_book(3))
            .await
            .expect("update");

        let request = server.await.expect("server task");
        assert_eq!(request.method, "PUT");
        assert_eq!(request.path, "/api/products/3");
    }

    #[tokio::test]
    async fn delete_of_missing_entity_reports_not_found() {
        let (base_url, server) = answer_once(404, String::new()).await;
        let repository = RestShopRepository::new(base_url, "secret").expect("client");

        let error = repository.delete_order(9).await.expect_err("missing order");

        assert!(matches!(
            error,
            RepositoryError::NotFound {
                collection: "orders",
                id: 9
            }
        ));
        let request = server.await.expect("server task");
        assert_eq!(request.method, "DELETE");
    }
}
