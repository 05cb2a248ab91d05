fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Proto compilation is optional - skip if protoc not available. This
    // allows building the crate (and running non-STT tests) without a
    // protoc toolchain present.
    std::fs::create_dir_all("src/proto").ok();

    let protos = [("proto/stt.proto", "stt")];

    for (proto_path, name) in protos {
        if std::path::Path::new(proto_path).exists() {
            match tonic_build::configure()
                .build_server(false)
                .build_client(true)
                .out_dir("src/proto")
                .compile(&[proto_path], &["proto"])
            {
                Ok(_) => println!("cargo:warning={name} proto compilation successful"),
                Err(e) => {
                    println!("cargo:warning={name} proto compilation skipped: {e}");
                    println!("cargo:warning=Install protoc to enable the gRPC STT client");
                }
            }
        }
    }

    Ok(())
}
