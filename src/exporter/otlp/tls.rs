use std::fmt;
use std::fs;
use std::path::Path;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use tracing::debug;

use crate::error::ResolveError;

use super::OtlpProtocol;

const GRPC_APPEND_FAILURE: &str = "credentials: failed to append certificates";
const HTTP_APPEND_FAILURE: &str = "failed to append certificate to the cert pool";

/// Certificates read from a configured PEM bundle.
///
/// The raw PEM feeds tonic, the parsed certificates feed reqwest.
#[derive(Clone)]
pub(crate) struct TrustPool {
    pem: Vec<u8>,
    certificates: Vec<reqwest::Certificate>,
}

impl TrustPool {
    pub(crate) fn pem(&self) -> &[u8] {
        &self.pem
    }

    pub(crate) fn certificates(&self) -> &[reqwest::Certificate] {
        &self.certificates
    }
}

impl fmt::Debug for TrustPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustPool")
            .field("certificates", &self.certificates.len())
            .finish()
    }
}

/// Reads `path` and parses it as a PEM certificate bundle.
///
/// Each block must decode to an X.509 certificate to be trusted. Blocks that
/// do not are skipped; a bundle left without a single certificate is rejected.
pub(crate) fn load(path: &Path, protocol: OtlpProtocol) -> Result<TrustPool, ResolveError> {
    let pem = fs::read(path)
        .map_err(|e| ResolveError::TlsCredentials(format!("open {}: {e}", path.display())))?;

    let rejected = || ResolveError::TlsCredentials(append_failure(protocol).to_string());

    let mut roots = RootCertStore::empty();
    let mut certificates = Vec::new();
    for block in CertificateDer::pem_slice_iter(&pem) {
        // a malformed block ends the bundle
        let Ok(der) = block else { break };
        if let Err(err) = roots.add(der.clone()) {
            debug!(path = %path.display(), error = %err, "skipping unparsable certificate");
            continue;
        }
        certificates.push(reqwest::Certificate::from_der(&der).map_err(|_| rejected())?);
    }

    if certificates.is_empty() {
        return Err(rejected());
    }

    Ok(TrustPool { pem, certificates })
}

fn append_failure(protocol: OtlpProtocol) -> &'static str {
    match protocol {
        OtlpProtocol::Grpc => GRPC_APPEND_FAILURE,
        OtlpProtocol::HttpProtobuf | OtlpProtocol::HttpJson => HTTP_APPEND_FAILURE,
    }
}
