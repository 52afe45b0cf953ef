//! Single error sum type for every decoder path, in the teacher's
//! `error_chain!` style (see the original `src/error.rs`).

error_chain! {
    foreign_links {
        Io(::std::io::Error);
        Utf8(::std::string::FromUtf8Error);
        Xml(::roxmltree::Error);
    }

    errors {
        /// A read would have passed the end of the input buffer.
        Truncated {
            description("truncated input")
            display("read past the end of the input buffer")
        }
        /// Magic bytes did not match the claimed container format.
        BadHeader(t: String) {
            description("bad header")
            display("bad header: {}", t)
        }
        /// Format detection found no match and no usable filename hint.
        UnrecognizedFormat {
            description("unrecognized format")
            display("could not recognize file format")
        }
        /// A version-specific decoder was invoked on the wrong version string.
        UnsupportedVersion(t: String) {
            description("unsupported version")
            display("unsupported version: {}", t)
        }
        /// RFC 1951 DEFLATE stream violated the format.
        CorruptDeflate(t: String) {
            description("corrupt deflate stream")
            display("corrupt deflate stream: {}", t)
        }
        /// Archive entry used a compression method other than stored/deflate.
        UnsupportedCompression(t: u16) {
            description("unsupported compression method")
            display("unsupported compression method: {}", t)
        }
        /// GPX/BCFS container or GPIF XML was structurally incomplete.
        BadContainer(t: String) {
            description("bad container")
            display("bad container: {}", t)
        }
        /// The XML document did not have the shape GPIF requires.
        BadXml(t: String) {
            description("bad xml")
            display("bad xml: {}", t)
        }
    }
}

impl From<Error> for String {
    fn from(err: Error) -> String {
        err.to_string()
    }
}
