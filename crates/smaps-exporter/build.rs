fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::configure()
        .build_server(false) // We only need the clients
        .compile_protos(
            &[
                "proto/cri.proto",
                "proto/containerd_containers.proto",
                "proto/containerd_tasks.proto",
            ],
            &["proto"],
        )?;
    Ok(())
}
