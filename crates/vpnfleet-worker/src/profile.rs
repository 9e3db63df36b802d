//! Client profile rendering.

use sha2::{Digest, Sha256};
use vpnfleet_core::CertificateBundle;
use vpnfleet_proto::ProfileParams;

/// Render an OpenVPN client profile with the certificate blocks inlined.
pub fn render_profile(params: &ProfileParams, bundle: &CertificateBundle) -> String {
    format!(
        "# OpenVPN Configuration for {username} on {server_id}\n\
         # Generated by vpnfleet worker\n\
         # Server: {server_ip}\n\
         # User: {username}\n\
         # Port: {port}\n\
         # Protocol: {protocol}\n\
         \n\
         client\n\
         dev tun\n\
         proto {protocol}\n\
         remote {server_ip} {port}\n\
         resolv-retry infinite\n\
         nobind\n\
         persist-key\n\
         persist-tun\n\
         cipher AES-256-CBC\n\
         data-ciphers AES-256-GCM:AES-256-CBC\n\
         auth SHA256\n\
         verb 3\n\
         \n\
         # Security settings\n\
         tls-client\n\
         remote-cert-tls server\n\
         tls-version-min 1.2\n\
         tls-cipher TLS-ECDHE-RSA-WITH-AES-256-GCM-SHA384:TLS-ECDHE-RSA-WITH-AES-256-CBC-SHA\n\
         keepalive 10 60\n\
         \n\
         <ca>\n{ca}\n</ca>\n\
         \n\
         <cert>\n{cert}\n</cert>\n\
         \n\
         <key>\n{key}\n</key>\n\
         \n\
         # TLS-Crypt Key\n\
         <tls-crypt>\n{ta}\n</tls-crypt>\n",
        username = params.username,
        server_id = params.server_id,
        server_ip = params.server_ip,
        port = params.port,
        protocol = params.protocol,
        ca = bundle.ca.trim(),
        cert = bundle.cert.trim(),
        key = bundle.key.trim(),
        ta = bundle.ta.trim(),
    )
}

/// SHA-256 of the profile bytes, lowercase hex.
pub fn checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}
