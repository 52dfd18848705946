fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Porto speaks plain protobuf over a unix socket, so only messages are
    // generated (no gRPC client or server).
    tonic_build::configure()
        .build_server(false)
        .build_client(false)
        .compile_protos(&["proto/porto.proto"], &["proto"])?;
    Ok(())
}
