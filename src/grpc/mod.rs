//! gRPC server module for the admission check service.

mod server;
mod service;

pub use server::GrpcServer;
pub use service::RateLimitServiceImpl;

// Include the generated protobuf code
pub mod proto {
    pub mod tollgate {
        pub mod v1 {
            tonic::include_proto!("tollgate.v1");
        }
    }
}

