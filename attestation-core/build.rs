use openssl::version::{number, version};

fn main() {
    // Ed25519 / Ed448 raw public keys and one-shot verification need OpenSSL 1.1.1.
    // LibreSSL reports as OpenSSL v2 (which was skipped).
    #[allow(clippy::unusual_byte_groupings)]
    if number() < 0x1_01_01_00_0 {
        println!(
            r#"
Your version of OpenSSL is out of date, and not supported by this library.

Please upgrade to OpenSSL v1.1.1 or later.

OpenSSL version string: {}
"#,
            version(),
        );
        panic!("The installed version of OpenSSL is unusable.");
    }
}
