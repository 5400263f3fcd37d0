//! Low-level MySQL client: connection establishment, authentication, and
//! the text query protocol.
//!
//! All failures surface as [`DriverError`]; I/O failures additionally
//! latch the `lost` flag so the driver above can distinguish a severed
//! connection from a rejected statement.

#![allow(clippy::cast_possible_truncation)]

use std::io::{Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use sqlbridge_core::settings::ResolvedTls;
use sqlbridge_core::{ColumnInfo, ColumnMeta, DriverError, DriverErrorKind, Row, Value};

use crate::auth;
use crate::protocol::{
    ByteReader, ByteWriter, Command, ErrPacket, MAX_PACKET_SIZE, PacketHeader, PacketType,
    capabilities, charset, codec, column_type,
};

/// Version of this client library, used for capability probes that
/// depend on client-side charset support.
pub const CLIENT_VERSION: &str = "8.0.32";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Escape a string for interpolation into a statement and wrap it in
/// single quotes.
pub fn quote(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 2);
    result.push('\'');
    for ch in text.chars() {
        match ch {
            '\0' => result.push_str("\\0"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '\x1a' => result.push_str("\\Z"),
            _ => result.push(ch),
        }
    }
    result.push('\'');
    result
}

/// The transport under the protocol.
enum NetStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(feature = "tls")]
    Tls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
    /// Placeholder while the transport is being swapped out.
    Detached,
}

fn detached_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "stream detached")
}

impl Read for NetStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            NetStream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            NetStream::Unix(s) => s.read(buf),
            #[cfg(feature = "tls")]
            NetStream::Tls(s) => s.read(buf),
            NetStream::Detached => Err(detached_error()),
        }
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            NetStream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            NetStream::Unix(s) => s.write(buf),
            #[cfg(feature = "tls")]
            NetStream::Tls(s) => s.write(buf),
            NetStream::Detached => Err(detached_error()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            NetStream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            NetStream::Unix(s) => s.flush(),
            #[cfg(feature = "tls")]
            NetStream::Tls(s) => s.flush(),
            NetStream::Detached => Err(detached_error()),
        }
    }
}

/// Server handshake fields the client keeps.
struct Handshake {
    server_version: String,
    connection_id: u32,
    capabilities: u32,
    auth_plugin: String,
    auth_data: Vec<u8>,
}

/// A materialized text-protocol result set.
#[derive(Debug, Clone)]
pub struct TextResultSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
}

/// Outcome of a text-protocol statement.
#[derive(Debug)]
pub enum QueryOutput {
    /// The server replied with OK (writes, DDL, SET, ...)
    Ok { affected: u64, insert_id: u64 },
    /// The server replied with rows
    ResultSet(TextResultSet),
}

/// A live protocol session with one server.
pub struct RawClient {
    stream: NetStream,
    sequence_id: u8,
    server_version: String,
    connection_id: u32,
    capabilities: u32,
    affected_rows: u64,
    last_insert_id: u64,
    warnings: u16,
    lost: bool,
    secure: bool,
}

impl std::fmt::Debug for RawClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawClient")
            .field("connection_id", &self.connection_id)
            .field("server_version", &self.server_version)
            .field("lost", &self.lost)
            .finish_non_exhaustive()
    }
}

impl RawClient {
    /// Connect and authenticate.
    ///
    /// `port_or_socket` is either a port number or a path ending in
    /// `.sock`, in which case a unix domain socket is used.
    pub fn connect(
        host: &str,
        user: &str,
        password: &str,
        port_or_socket: &str,
        database: &str,
        charset_code: u8,
        tls: Option<&ResolvedTls>,
    ) -> Result<Self, DriverError> {
        let stream = open_stream(host, port_or_socket)?;

        let mut client = Self {
            stream,
            sequence_id: 0,
            server_version: String::new(),
            connection_id: 0,
            capabilities: 0,
            affected_rows: 0,
            last_insert_id: 0,
            warnings: 0,
            lost: false,
            secure: false,
        };

        let handshake = client.read_handshake()?;
        client.server_version = handshake.server_version.clone();
        client.connection_id = handshake.connection_id;

        let mut client_caps = capabilities::BASE_CLIENT_FLAGS & handshake.capabilities;
        if !database.is_empty() {
            client_caps |= capabilities::CLIENT_CONNECT_WITH_DB;
        }

        if let Some(tls) = tls {
            if handshake.capabilities & capabilities::CLIENT_SSL == 0 {
                return Err(DriverError::new(
                    DriverErrorKind::Connect,
                    "server does not support encrypted connections",
                ));
            }
            client_caps |= capabilities::CLIENT_SSL;
            client.upgrade_to_tls(host, client_caps, charset_code, tls)?;
        }
        client.capabilities = client_caps;

        client.send_handshake_response(
            user,
            password,
            database,
            charset_code,
            &handshake.auth_plugin,
            &handshake.auth_data,
        )?;
        client.finish_authentication(password)?;

        tracing::debug!(
            connection_id = client.connection_id,
            server_version = %client.server_version,
            "connected"
        );
        Ok(client)
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    /// Whether an I/O failure has severed this connection.
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Run a statement through the text protocol.
    pub fn com_query(&mut self, sql: &str) -> Result<QueryOutput, DriverError> {
        self.sequence_id = 0;
        let packet = codec::build_command_packet(Command::Query as u8, sql.as_bytes(), 0);
        self.sequence_id = self.sequence_id.wrapping_add(1);
        self.write_raw(&packet)?;

        let payload = self.read_packet()?;
        if payload.is_empty() {
            return Err(self.mark_lost("empty query response"));
        }

        match PacketType::from_first_byte(payload[0], payload.len() as u32) {
            PacketType::Ok => {
                let mut reader = ByteReader::new(&payload);
                if let Some(ok) = reader.parse_ok_packet() {
                    self.affected_rows = ok.affected_rows;
                    self.last_insert_id = ok.last_insert_id;
                    self.warnings = ok.warnings;
                }
                Ok(QueryOutput::Ok {
                    affected: self.affected_rows,
                    insert_id: self.last_insert_id,
                })
            }
            PacketType::Error => {
                let mut reader = ByteReader::new(&payload);
                match reader.parse_err_packet() {
                    Some(err) => Err(execution_error(&err)),
                    None => Err(self.mark_lost("malformed error packet")),
                }
            }
            PacketType::LocalInfile => Err(DriverError::execution("LOCAL INFILE not supported")),
            _ => self.read_result_set(&payload).map(QueryOutput::ResultSet),
        }
    }

    /// Switch the connection to another database.
    pub fn com_init_db(&mut self, database: &str) -> Result<(), DriverError> {
        self.sequence_id = 0;
        let packet = codec::build_command_packet(Command::InitDb as u8, database.as_bytes(), 0);
        self.sequence_id = self.sequence_id.wrapping_add(1);
        self.write_raw(&packet)?;

        let payload = self.read_packet()?;
        match payload.first() {
            Some(0x00) => Ok(()),
            Some(0xFF) => {
                let mut reader = ByteReader::new(&payload);
                match reader.parse_err_packet() {
                    Some(err) => Err(DriverError {
                        kind: DriverErrorKind::SelectDatabase,
                        code: Some(err.error_code),
                        sqlstate: sqlstate_of(&err),
                        message: err.error_message,
                    }),
                    None => Err(self.mark_lost("malformed error packet")),
                }
            }
            _ => Err(self.mark_lost("unexpected response to database switch")),
        }
    }

    /// Probe the server.
    pub fn com_ping(&mut self) -> bool {
        self.sequence_id = 0;
        let packet = codec::build_command_packet(Command::Ping as u8, &[], 0);
        self.sequence_id = self.sequence_id.wrapping_add(1);
        if self.write_raw(&packet).is_err() {
            return false;
        }
        match self.read_packet() {
            Ok(payload) => payload.first() == Some(&0x00),
            Err(_) => false,
        }
    }

    /// Send COM_QUIT. Best effort; the connection is done either way.
    pub fn quit(&mut self) {
        self.sequence_id = 0;
        let packet = codec::build_command_packet(Command::Quit as u8, &[], 0);
        let _ = self.stream.write_all(&packet);
        let _ = self.stream.flush();
        self.lost = true;
    }

    fn read_handshake(&mut self) -> Result<Handshake, DriverError> {
        let payload = self.read_packet()?;
        let mut reader = ByteReader::new(&payload);

        let protocol_version = reader
            .read_u8()
            .ok_or_else(|| connect_error("missing protocol version"))?;
        if protocol_version != 10 {
            return Err(connect_error(format!(
                "unsupported protocol version: {protocol_version}"
            )));
        }

        let server_version = reader
            .read_null_string()
            .ok_or_else(|| connect_error("missing server version"))?;
        let connection_id = reader
            .read_u32_le()
            .ok_or_else(|| connect_error("missing connection id"))?;
        let auth_data_1 = reader
            .read_bytes(8)
            .ok_or_else(|| connect_error("missing auth data"))?;

        reader.skip(1); // filler

        let caps_lower = reader
            .read_u16_le()
            .ok_or_else(|| connect_error("missing capability flags"))?;
        let _charset = reader.read_u8();
        let _status_flags = reader.read_u16_le();
        let caps_upper = reader.read_u16_le().unwrap_or(0);
        let server_caps = u32::from(caps_lower) | (u32::from(caps_upper) << 16);

        let auth_data_len = if server_caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            reader.read_u8().unwrap_or(0) as usize
        } else {
            0
        };

        reader.skip(10); // reserved

        let mut auth_data = auth_data_1.to_vec();
        if server_caps & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            let len2 = if auth_data_len > 8 { auth_data_len - 8 } else { 13 };
            if let Some(data2) = reader.read_bytes(len2) {
                let data2 = if data2.last() == Some(&0) {
                    &data2[..data2.len() - 1]
                } else {
                    data2
                };
                auth_data.extend_from_slice(data2);
            }
        }

        let auth_plugin = if server_caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            reader.read_null_string().unwrap_or_default()
        } else {
            auth::plugins::MYSQL_NATIVE_PASSWORD.to_string()
        };

        Ok(Handshake {
            server_version,
            connection_id,
            capabilities: server_caps,
            auth_plugin,
            auth_data,
        })
    }

    #[cfg(feature = "tls")]
    fn upgrade_to_tls(
        &mut self,
        host: &str,
        client_caps: u32,
        charset_code: u8,
        tls: &ResolvedTls,
    ) -> Result<(), DriverError> {
        // Short SSLRequest packet: capabilities, max packet size, charset,
        // 23 reserved bytes. The full handshake response follows on the
        // encrypted stream.
        let mut writer = ByteWriter::new();
        writer.write_u32_le(client_caps);
        writer.write_u32_le(MAX_PACKET_SIZE as u32);
        writer.write_u8(charset_code);
        writer.write_zeros(23);
        self.write_packet(&writer.into_bytes())?;

        let NetStream::Tcp(tcp) = std::mem::replace(&mut self.stream, NetStream::Detached) else {
            return Err(DriverError::new(
                DriverErrorKind::Connect,
                "encryption is only supported over TCP",
            ));
        };

        let stream = crate::tls::wrap(tcp, host, tls)?;
        self.stream = NetStream::Tls(Box::new(stream));
        self.secure = true;
        Ok(())
    }

    #[cfg(not(feature = "tls"))]
    #[allow(clippy::unused_self)]
    fn upgrade_to_tls(
        &mut self,
        _host: &str,
        _client_caps: u32,
        _charset_code: u8,
        _tls: &ResolvedTls,
    ) -> Result<(), DriverError> {
        Err(DriverError::new(
            DriverErrorKind::Connect,
            "encrypted connections require the tls feature",
        ))
    }

    fn send_handshake_response(
        &mut self,
        user: &str,
        password: &str,
        database: &str,
        charset_code: u8,
        auth_plugin: &str,
        auth_data: &[u8],
    ) -> Result<(), DriverError> {
        let auth_response = compute_auth_response(auth_plugin, password, auth_data);

        let mut writer = ByteWriter::new();
        writer.write_u32_le(self.capabilities);
        writer.write_u32_le(MAX_PACKET_SIZE as u32);
        writer.write_u8(charset_code);
        writer.write_zeros(23);
        writer.write_null_string(user);

        if self.capabilities & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            writer.write_lenenc_bytes(&auth_response);
        } else if self.capabilities & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            writer.write_u8(auth_response.len() as u8);
            writer.write_bytes(&auth_response);
        } else {
            writer.write_bytes(&auth_response);
            writer.write_u8(0);
        }

        if self.capabilities & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
            writer.write_null_string(database);
        }

        if self.capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            writer.write_null_string(auth_plugin);
        }

        self.write_packet(&writer.into_bytes())
    }

    /// Read auth packets until OK, handling auth switch and the
    /// caching_sha2_password sub-protocol.
    fn finish_authentication(&mut self, password: &str) -> Result<(), DriverError> {
        loop {
            let payload = self.read_packet()?;
            if payload.is_empty() {
                return Err(self.mark_lost("empty authentication response"));
            }

            match PacketType::from_first_byte(payload[0], payload.len() as u32) {
                PacketType::Ok => return Ok(()),
                PacketType::Error => {
                    let mut reader = ByteReader::new(&payload);
                    let err = reader
                        .parse_err_packet()
                        .ok_or_else(|| connect_error("malformed error packet"))?;
                    return Err(DriverError {
                        kind: DriverErrorKind::Authentication,
                        code: Some(err.error_code),
                        sqlstate: sqlstate_of(&err),
                        message: format!("access denied: {}", err.error_message),
                    });
                }
                PacketType::Eof => {
                    // Auth switch request: plugin name, then fresh scramble.
                    let mut reader = ByteReader::new(&payload[1..]);
                    let plugin = reader
                        .read_null_string()
                        .ok_or_else(|| connect_error("missing plugin in auth switch"))?;
                    let auth_data = reader.read_rest().to_vec();
                    let response = compute_auth_response(&plugin, password, &auth_data);
                    self.write_packet(&response)?;
                }
                _ => {
                    // AuthMoreData: 0x01 followed by a status byte.
                    let status = if payload[0] == 0x01 {
                        payload.get(1).copied()
                    } else {
                        Some(payload[0])
                    };
                    match status {
                        Some(auth::caching_sha2::FAST_AUTH_SUCCESS) => {
                            // Final OK follows on the next iteration.
                        }
                        Some(auth::caching_sha2::PERFORM_FULL_AUTH) => {
                            if self.secure {
                                self.write_packet(&auth::cleartext_password(password))?;
                            } else {
                                return Err(DriverError::new(
                                    DriverErrorKind::Authentication,
                                    "caching_sha2_password full authentication requires an \
                                     encrypted connection",
                                ));
                            }
                        }
                        other => {
                            return Err(connect_error(format!(
                                "unexpected auth response: {other:02X?}"
                            )));
                        }
                    }
                }
            }
        }
    }

    fn read_result_set(&mut self, first_packet: &[u8]) -> Result<TextResultSet, DriverError> {
        let mut reader = ByteReader::new(first_packet);
        let column_count = reader
            .read_lenenc_int()
            .ok_or_else(|| self.mark_lost("invalid column count"))? as usize;

        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let payload = self.read_packet()?;
            columns.push(parse_column_def(&payload).ok_or_else(|| {
                DriverError::new(DriverErrorKind::ConnectionLost, "malformed column definition")
            })?);
        }

        if self.capabilities & capabilities::CLIENT_DEPRECATE_EOF == 0 {
            // Old servers send an EOF between columns and rows.
            let _ = self.read_packet()?;
        }

        let column_info = Arc::new(ColumnInfo::new(
            columns.iter().map(|c| c.name.clone()).collect(),
        ));

        let mut rows = Vec::new();
        loop {
            let payload = self.read_packet()?;
            if payload.is_empty() {
                break;
            }
            match PacketType::from_first_byte(payload[0], payload.len() as u32) {
                PacketType::Eof | PacketType::Ok => {
                    let mut reader = ByteReader::new(&payload);
                    if payload[0] == 0x00 {
                        if let Some(ok) = reader.parse_ok_packet() {
                            self.warnings = ok.warnings;
                        }
                    } else if let Some(eof) = reader.parse_eof_packet() {
                        self.warnings = eof.warnings;
                    }
                    break;
                }
                PacketType::Error => {
                    let mut reader = ByteReader::new(&payload);
                    let err = reader
                        .parse_err_packet()
                        .ok_or_else(|| self.mark_lost("malformed error packet"))?;
                    return Err(execution_error(&err));
                }
                _ => {
                    rows.push(parse_text_row(&payload, &columns, &column_info));
                }
            }
        }

        Ok(TextResultSet { columns, rows })
    }

    fn read_packet(&mut self) -> Result<Vec<u8>, DriverError> {
        let mut header_buf = [0u8; 4];
        if let Err(e) = self.stream.read_exact(&mut header_buf) {
            return Err(self.mark_lost(format!("failed to read packet header: {e}")));
        }

        let header = PacketHeader::from_bytes(&header_buf);
        let payload_len = header.payload_length as usize;
        self.sequence_id = header.sequence_id.wrapping_add(1);

        let mut payload = vec![0u8; payload_len];
        if payload_len > 0 {
            if let Err(e) = self.stream.read_exact(&mut payload) {
                return Err(self.mark_lost(format!("failed to read packet payload: {e}")));
            }
        }

        // Reassemble multi-packet payloads.
        if payload_len == MAX_PACKET_SIZE {
            loop {
                let mut header_buf = [0u8; 4];
                if let Err(e) = self.stream.read_exact(&mut header_buf) {
                    return Err(self.mark_lost(format!("failed to read continuation: {e}")));
                }
                let cont = PacketHeader::from_bytes(&header_buf);
                let cont_len = cont.payload_length as usize;
                self.sequence_id = cont.sequence_id.wrapping_add(1);

                if cont_len > 0 {
                    let mut cont_payload = vec![0u8; cont_len];
                    if let Err(e) = self.stream.read_exact(&mut cont_payload) {
                        return Err(self.mark_lost(format!("failed to read continuation: {e}")));
                    }
                    payload.extend_from_slice(&cont_payload);
                }

                if cont_len < MAX_PACKET_SIZE {
                    break;
                }
            }
        }

        Ok(payload)
    }

    fn write_packet(&mut self, payload: &[u8]) -> Result<(), DriverError> {
        let packet = codec::build_packet_from_payload(payload, self.sequence_id);
        self.sequence_id = self.sequence_id.wrapping_add(1);
        self.write_raw(&packet)
    }

    fn write_raw(&mut self, packet: &[u8]) -> Result<(), DriverError> {
        if let Err(e) = self.stream.write_all(packet) {
            return Err(self.mark_lost(format!("failed to write packet: {e}")));
        }
        if let Err(e) = self.stream.flush() {
            return Err(self.mark_lost(format!("failed to flush stream: {e}")));
        }
        Ok(())
    }

    fn mark_lost(&mut self, message: impl Into<String>) -> DriverError {
        self.lost = true;
        DriverError::new(DriverErrorKind::ConnectionLost, message)
    }
}

fn open_stream(host: &str, port_or_socket: &str) -> Result<NetStream, DriverError> {
    if port_or_socket.ends_with(".sock") {
        #[cfg(unix)]
        {
            let stream = UnixStream::connect(port_or_socket).map_err(|e| {
                connect_error(format!("failed to connect to {port_or_socket}: {e}"))
            })?;
            return Ok(NetStream::Unix(stream));
        }
        #[cfg(not(unix))]
        {
            return Err(connect_error("unix sockets are not supported here"));
        }
    }

    let port: u16 = port_or_socket
        .parse()
        .map_err(|_| connect_error(format!("invalid port: {port_or_socket}")))?;
    let stream = TcpStream::connect((host, port))
        .map_err(|e| connect_error(format!("failed to connect to {host}:{port}: {e}")))?;
    stream.set_nodelay(true).ok();
    stream.set_read_timeout(Some(CONNECT_TIMEOUT)).ok();
    stream.set_write_timeout(Some(CONNECT_TIMEOUT)).ok();
    Ok(NetStream::Tcp(stream))
}

fn compute_auth_response(plugin: &str, password: &str, auth_data: &[u8]) -> Vec<u8> {
    match plugin {
        auth::plugins::CACHING_SHA2_PASSWORD => auth::caching_sha2_password(password, auth_data),
        auth::plugins::MYSQL_CLEAR_PASSWORD => auth::cleartext_password(password),
        // mysql_native_password, and the best guess for unknown plugins
        _ => auth::mysql_native_password(password, auth_data),
    }
}

fn connect_error(message: impl Into<String>) -> DriverError {
    DriverError::new(DriverErrorKind::Connect, message)
}

fn execution_error(err: &ErrPacket) -> DriverError {
    DriverError {
        kind: DriverErrorKind::Execution,
        code: Some(err.error_code),
        sqlstate: sqlstate_of(err),
        message: err.error_message.clone(),
    }
}

fn sqlstate_of(err: &ErrPacket) -> Option<String> {
    if err.sql_state.is_empty() {
        None
    } else {
        Some(err.sql_state.clone())
    }
}

/// Parse a column definition packet.
fn parse_column_def(data: &[u8]) -> Option<ColumnMeta> {
    let mut reader = ByteReader::new(data);

    let catalog = reader.read_lenenc_string()?;
    let schema = reader.read_lenenc_string()?;
    let table = reader.read_lenenc_string()?;
    let org_table = reader.read_lenenc_string()?;
    let name = reader.read_lenenc_string()?;
    let org_name = reader.read_lenenc_string()?;

    let _fixed_len = reader.read_lenenc_int();

    let charset = reader.read_u16_le()?;
    let column_length = reader.read_u32_le()?;
    let column_type = reader.read_u8()?;
    let flags = reader.read_u16_le()?;
    let decimals = reader.read_u8()?;

    Some(ColumnMeta {
        catalog,
        schema,
        table,
        org_table,
        name,
        org_name,
        charset,
        column_length,
        column_type,
        flags,
        decimals,
    })
}

/// Parse a text protocol row. NULL cells arrive as the 0xFB marker.
fn parse_text_row(data: &[u8], columns: &[ColumnMeta], column_info: &Arc<ColumnInfo>) -> Row {
    let mut reader = ByteReader::new(data);
    let mut values = Vec::with_capacity(columns.len());

    for col in columns {
        if reader.peek() == Some(0xFB) {
            reader.skip(1);
            values.push(Value::Null);
        } else if let Some(cell) = reader.read_lenenc_bytes() {
            values.push(decode_text_value(col, &cell));
        } else {
            values.push(Value::Null);
        }
    }

    Row::with_columns(Arc::clone(column_info), values)
}

/// Decode one text-protocol cell by column type.
///
/// The text protocol transmits everything as strings; numeric column
/// types are parsed, blob types with the binary charset stay as bytes,
/// everything else (dates, decimals, strings) stays text.
fn decode_text_value(col: &ColumnMeta, data: &[u8]) -> Value {
    match col.column_type {
        column_type::NULL => Value::Null,
        column_type::TINY
        | column_type::SHORT
        | column_type::LONG
        | column_type::INT24
        | column_type::LONGLONG
        | column_type::YEAR => {
            let text = String::from_utf8_lossy(data);
            if col.is_unsigned() {
                text.parse::<u64>()
                    .map_or_else(|_| Value::Text(text.into_owned()), Value::UInt)
            } else {
                text.parse::<i64>()
                    .map_or_else(|_| Value::Text(text.into_owned()), Value::Int)
            }
        }
        column_type::FLOAT | column_type::DOUBLE => {
            let text = String::from_utf8_lossy(data);
            text.parse::<f64>()
                .map_or_else(|_| Value::Text(text.into_owned()), Value::Double)
        }
        column_type::BIT => Value::Bytes(data.to_vec()),
        column_type::TINY_BLOB
        | column_type::MEDIUM_BLOB
        | column_type::LONG_BLOB
        | column_type::BLOB
            if col.charset == u16::from(charset::BINARY) =>
        {
            Value::Bytes(data.to_vec())
        }
        // DECIMAL stays text to preserve precision; so do dates, times,
        // strings, and TEXT columns (blob types with a text charset).
        _ => Value::Text(String::from_utf8_lossy(data).into_owned()),
    }
}
