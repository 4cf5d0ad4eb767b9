//! Messages and client for the `libguestfs.VirtSparsify` service.
//!
//! Written in the shape tonic-build emits so no protoc is needed at build
//! time:
//!
//! ```text
//! service VirtSparsify { rpc Sparsify(Image) returns (Response); }
//! message Image { string path = 1; }
//! ```

/// Image to sparsify, addressed by its path inside the sidecar.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Image {
    #[prost(string, tag = "1")]
    pub path: ::prost::alloc::string::String,
}

/// Sparsify reply. Callers only look at the status; any fields the sidecar
/// sets are skipped on decode.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SparsifyResponse {}

pub const SERVICE_NAME: &str = "libguestfs.VirtSparsify";
pub const SPARSIFY_PATH: &str = "/libguestfs.VirtSparsify/Sparsify";

pub mod virt_sparsify_client {
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct VirtSparsifyClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl<T> VirtSparsifyClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        pub async fn sparsify(
            &mut self,
            request: impl tonic::IntoRequest<super::Image>,
        ) -> std::result::Result<tonic::Response<super::SparsifyResponse>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(super::SPARSIFY_PATH);
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new(super::SERVICE_NAME, "Sparsify"));
            self.inner.unary(req, path, codec).await
        }
    }
}
