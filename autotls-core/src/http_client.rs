use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use instant_acme::{BodyWrapper, BytesResponse, HttpClient};

/// Bridges `instant-acme`'s `HttpClient` trait to a `hyper-rustls` client built on the
/// platform trust store, the way the engine reaches ACME endpoints and DNS-01 propagation
/// checks over the same TLS stack it serves with.
pub struct HttpsClient(Client<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>, BodyWrapper<Bytes>>);

impl HttpsClient {
  pub fn new() -> Self {
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
      .with_native_roots()
      .expect("native root certificates must be loadable")
      .https_or_http()
      .enable_http1()
      .enable_http2()
      .build();
    Self(Client::builder(TokioExecutor::new()).build(connector))
  }
}

impl Default for HttpsClient {
  fn default() -> Self {
    Self::new()
  }
}

impl HttpClient for HttpsClient {
  fn request(&self, req: Request<BodyWrapper<Bytes>>) -> Pin<Box<dyn Future<Output = Result<BytesResponse, instant_acme::Error>> + Send>> {
    HttpClient::request(&self.0, req)
  }
}
