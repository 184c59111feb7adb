//! Host-facing adapters: procfs access and the gRPC clients that talk to
//! containerd over its unix socket.

#![allow(clippy::doc_markdown)]

pub mod containerd;
pub mod cri;
pub mod grpc;
pub mod procfs;

pub mod api {
    pub mod cri {
        tonic::include_proto!("runtime.v1");
    }

    pub mod containers {
        tonic::include_proto!("containerd.services.containers.v1");
    }

    pub mod tasks {
        tonic::include_proto!("containerd.services.tasks.v1");
    }
}
