//! High-level sensor interface

use std::collections::BTreeSet;
use std::sync::Arc;

use as608_core::command::args;
use as608_core::constants::{
    buffers::{CHAR_BUFFER_1, CHAR_BUFFER_2},
    sys_params, BROADCAST_ADDRESS, IMAGE_SIZE, INDEX_PAGE_SLOTS,
};
use as608_core::{Command, ConfirmationCode, ConnectionState, ExpectedSize, Frame};
use as608_transport::{SerialTransport, TcpTransport, Transport};
use as608_types::{FingerprintImage, PacketSize, SearchMatch, SecurityLevel, SystemParameters, Template, TemplateIndex};
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bulk::{self, Download, UploadAck};
use crate::config::SensorConfig;
use crate::error::{EnrollStep, Error, Result};
use crate::events::StatusEvent;
use crate::exchange::{check_ack, Channel, ChannelGuard};

/// AS608-family fingerprint sensor
///
/// Cheap to clone; every clone drives the same link. Operations from
/// different clones or tasks are serialized on the channel lock.
///
/// # Examples
///
/// ```no_run
/// use as608::Sensor;
///
/// #[tokio::main]
/// async fn main() -> as608::Result<()> {
///     let sensor = Sensor::new("/dev/ttyUSB0");
///
///     sensor.connect().await?;
///     sensor.enroll_to_page(7).await?;
///
///     if let Some(hit) = sensor.identify().await? {
///         println!("Matched {}", hit);
///     }
///
///     sensor.disconnect().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Sensor {
    channel: Arc<Channel>,
}

impl Sensor {
    /// Sensor on a local serial port at the default 57600 baud
    pub fn new(path: impl Into<String>) -> Self {
        Self::serial(path, SerialTransport::DEFAULT_BAUD_RATE, SensorConfig::default())
    }

    /// Sensor on a local serial port
    pub fn serial(path: impl Into<String>, baud_rate: u32, config: SensorConfig) -> Self {
        Self::from_transport(Box::new(SerialTransport::new(path, baud_rate)), config)
    }

    /// Sensor behind a serial-over-TCP bridge
    pub fn tcp(host: impl Into<String>, port: u16, config: SensorConfig) -> Self {
        Self::from_transport(Box::new(TcpTransport::new(host, port)), config)
    }

    /// Sensor on any transport
    pub fn from_transport(transport: Box<dyn Transport>, config: SensorConfig) -> Self {
        Self {
            channel: Arc::new(Channel::new(transport, config)),
        }
    }

    /// Connection-wide state
    pub fn state(&self) -> &ConnectionState {
        self.channel.state()
    }

    pub fn config(&self) -> &SensorConfig {
        self.channel.config()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.channel.state().is_connected()
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.channel.subscribe()
    }

    /// Open the link and unlock the module
    ///
    /// Verifies the password at the configured address and falls back to
    /// address recovery when the module does not accept it there.
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.channel.lock().await?;

        info!("Connecting to {}...", link.remote_addr());
        self.channel.emit(StatusEvent::Connecting {
            remote: link.remote_addr(),
        });

        link.open().await?;

        let result = self.unlock(&mut link).await;
        if let Err(e) = result {
            warn!("Connection setup failed: {}", e);
            if let Err(close) = link.close().await {
                debug!("Closing after failed setup: {}", close);
            }
            return Err(e);
        }

        let address = link.state().target_address();
        info!("Connected (address=0x{:08X})", address);
        self.channel.emit(StatusEvent::Connected { address });

        // Packet size and capacity are best effort; defaults work on stock modules
        if let Err(e) = read_parameters_on(&mut link).await {
            warn!("Parameter query after connect failed: {}", e);
        }

        debug!(
            packet_size = link.state().packet_size(),
            capacity = link.state().capacity(),
            "Session ready"
        );
        Ok(())
    }

    async fn unlock(&self, link: &mut ChannelGuard<'_>) -> Result<()> {
        let config = link.config();

        sleep(config.boot_delay).await;
        link.purge().await?;

        if let Err(e) = link.command(Command::Handshake, &[], config.timeouts.command).await {
            if e.requires_reconnect() {
                return Err(e);
            }
            debug!("Handshake not answered: {}", e);
        }
        link.purge().await?;

        match verify_password_on(link, self.channel.password()).await {
            Ok(()) => {}
            Err(e) if e.requires_reconnect() => return Err(e),
            Err(e) => {
                warn!("Password not accepted at 0x{:08X}: {}", link.state().target_address(), e);
                let address = recover_address_on(link, self.channel.password()).await?;
                self.channel.emit(StatusEvent::AddressRecovered { address });
            }
        }

        link.state().unlock()?;
        Ok(())
    }

    /// Close the link
    pub async fn disconnect(&self) -> Result<()> {
        let mut link = self.channel.lock().await?;

        if !link.is_open() && !link.state().is_connected() {
            return Ok(());
        }

        info!("Disconnecting from {}...", link.remote_addr());
        link.close().await?;
        self.channel.emit(StatusEvent::Disconnected);

        info!("Disconnected");
        Ok(())
    }

    /// Check that the module is alive
    pub async fn handshake(&self) -> Result<()> {
        let mut link = self.link().await?;
        let timeout = link.config().timeouts.command;
        link.command(Command::Handshake, &[], timeout).await?;
        Ok(())
    }

    /// Verify the configured password at the current address
    pub async fn verify_password(&self) -> Result<()> {
        let mut link = self.link().await?;
        verify_password_on(&mut link, self.channel.password()).await
    }

    /// Find the module's real address through a broadcast exchange
    ///
    /// The address in the ReadSysParams reply header is adopted as the target
    /// address and returned. A reply that itself comes from the broadcast
    /// address does not reveal the real one and fails with
    /// [`Error::Recovery`], leaving the previous target in place.
    pub async fn recover_address(&self) -> Result<u32> {
        let mut link = self.link().await?;
        let address = recover_address_on(&mut link, self.channel.password()).await?;
        self.channel.emit(StatusEvent::AddressRecovered { address });
        Ok(address)
    }

    /// Read the system parameters
    ///
    /// The reported packet size and library capacity are adopted for every
    /// following operation.
    pub async fn read_parameters(&self) -> Result<SystemParameters> {
        let mut link = self.link().await?;
        read_parameters_on(&mut link).await
    }

    /// Change the module password
    pub async fn set_password(&self, password: u32) -> Result<()> {
        let mut link = self.link().await?;
        let timeout = link.config().timeouts.command;

        link.command(Command::SetPassword, &args::password(password), timeout)
            .await?;
        self.channel.set_password(password);

        info!("Password changed");
        Ok(())
    }

    /// Change the matching threshold
    pub async fn set_security_level(&self, level: SecurityLevel) -> Result<()> {
        let mut link = self.link().await?;
        let timeout = link.config().timeouts.command;

        link.command(
            Command::SetSysParam,
            &args::sys_param(sys_params::SECURITY_LEVEL, level.level()),
            timeout,
        )
        .await?;

        debug!("Security level set to {}", level.level());
        Ok(())
    }

    /// Change the data packet size
    pub async fn set_packet_size(&self, size: PacketSize) -> Result<()> {
        let mut link = self.link().await?;
        let timeout = link.config().timeouts.command;

        link.command(
            Command::SetSysParam,
            &args::sys_param(sys_params::PACKET_SIZE, size.code()),
            timeout,
        )
        .await?;
        link.state().set_packet_size(size.bytes());

        debug!("Packet size set to {}", size);
        Ok(())
    }

    /// Capture a finger image into the image buffer
    pub async fn capture(&self) -> Result<()> {
        let mut link = self.link().await?;
        capture_on(&mut link).await
    }

    /// Extract features from the image buffer into a character buffer
    pub async fn extract(&self, buffer: u8) -> Result<()> {
        let mut link = self.link().await?;
        extract_on(&mut link, buffer).await
    }

    /// Capture then extract into `buffer`
    pub async fn capture_and_extract(&self, buffer: u8) -> Result<()> {
        let mut link = self.link().await?;
        capture_on(&mut link).await?;
        extract_on(&mut link, buffer).await
    }

    /// Merge both character buffers into a model
    pub async fn merge(&self) -> Result<()> {
        let mut link = self.link().await?;
        merge_on(&mut link).await
    }

    /// Two captures and a merge, leaving the model in both buffers
    ///
    /// The channel is held for the whole sequence. A failure names the step
    /// that failed.
    pub async fn enroll(&self) -> Result<()> {
        let mut link = self.link().await?;
        self.enroll_on(&mut link).await
    }

    /// Enroll and store the model at `page`
    pub async fn enroll_to_page(&self, page: u16) -> Result<()> {
        let mut link = self.link().await?;
        link.state().check_pages(page, 1)?;

        self.enroll_on(&mut link).await?;
        store_on(&mut link, CHAR_BUFFER_1, page).await
    }

    async fn enroll_on(&self, link: &mut ChannelGuard<'_>) -> Result<()> {
        let step = |step: EnrollStep| {
            move |e: Error| {
                warn!("Enrollment failed at {}: {}", step, e);
                Error::Enroll {
                    step,
                    source: Box::new(e),
                }
            }
        };

        info!("Enrolling...");

        capture_on(link).await.map_err(step(EnrollStep::FirstCapture))?;
        extract_on(link, CHAR_BUFFER_1)
            .await
            .map_err(step(EnrollStep::FirstExtract))?;

        self.channel.emit(StatusEvent::RemoveFinger);

        capture_on(link).await.map_err(step(EnrollStep::SecondCapture))?;
        extract_on(link, CHAR_BUFFER_2)
            .await
            .map_err(step(EnrollStep::SecondExtract))?;

        merge_on(link).await.map_err(step(EnrollStep::Merge))?;

        info!("Model ready");
        Ok(())
    }

    /// Store a character buffer at library page `page`
    pub async fn store(&self, buffer: u8, page: u16) -> Result<()> {
        let mut link = self.link().await?;
        store_on(&mut link, buffer, page).await
    }

    /// Load library page `page` into a character buffer
    pub async fn load_template(&self, buffer: u8, page: u16) -> Result<()> {
        let mut link = self.link().await?;
        load_on(&mut link, buffer, page).await
    }

    /// Delete `count` templates starting at `page`
    pub async fn delete(&self, page: u16, count: u16) -> Result<()> {
        let mut link = self.link().await?;
        link.state().check_pages(page, count)?;

        let timeout = link.config().timeouts.database;
        link.command(Command::DeleteChar, &args::delete(page, count), timeout)
            .await?;

        debug!("Deleted {} template(s) from page {}", count, page);
        self.channel.emit(StatusEvent::TemplatesDeleted { page, count });
        Ok(())
    }

    /// Delete every template in the library
    pub async fn empty(&self) -> Result<()> {
        let mut link = self.link().await?;
        let timeout = link.config().timeouts.database;

        link.purge().await?;
        link.command(Command::Empty, &[], timeout).await?;

        warn!("Template library emptied");
        self.channel.emit(StatusEvent::LibraryEmptied);
        Ok(())
    }

    /// Search `count` pages from `start` for the features in `buffer`
    ///
    /// `None` when nothing matched.
    pub async fn search(&self, buffer: u8, start: u16, count: u16) -> Result<Option<SearchMatch>> {
        let mut link = self.link().await?;
        search_on(&mut link, buffer, start, count).await
    }

    /// Capture, extract and search the whole library
    pub async fn identify(&self) -> Result<Option<SearchMatch>> {
        let mut link = self.link().await?;
        let capacity = link.state().capacity();

        capture_on(&mut link).await?;
        extract_on(&mut link, CHAR_BUFFER_1).await?;
        search_on(&mut link, CHAR_BUFFER_1, 0, capacity).await
    }

    /// Number of stored templates
    pub async fn template_count(&self) -> Result<u16> {
        let mut link = self.link().await?;
        let timeout = link.config().timeouts.database;

        let results = link.command(Command::TemplateCount, &[], timeout).await?;
        if results.len() < 2 {
            return Err(as608_core::Error::Malformed(format!(
                "template count needs 2 bytes, got {}",
                results.len()
            ))
            .into());
        }

        Ok(u16::from_be_bytes([results[0], results[1]]))
    }

    /// Occupied slots on one index page
    pub async fn read_index_page(&self, page: u8) -> Result<BTreeSet<u16>> {
        let mut link = self.link().await?;
        read_index_page_on(&mut link, page).await
    }

    /// Occupied slots across the whole library
    ///
    /// Pages that fail are listed in [`TemplateIndex::failed_pages`]; only
    /// when every page fails is the error returned.
    pub async fn read_index(&self) -> Result<TemplateIndex> {
        let mut link = self.link().await?;
        let capacity = link.state().capacity();
        let pages = u8::try_from(capacity.div_ceil(INDEX_PAGE_SLOTS).max(1)).map_err(|_| {
            Error::InvalidArgument(format!("library capacity {} exceeds the index table", capacity))
        })?;
        let gap = link.config().index_page_gap;

        let mut index = TemplateIndex::new();
        let mut last_error = None;

        for page in 0..pages {
            if page > 0 {
                sleep(gap).await;
            }

            match read_index_page_on(&mut link, page).await {
                Ok(slots) => index.occupied.extend(slots),
                Err(e) if e.requires_reconnect() => return Err(e),
                Err(e) => {
                    warn!("Index page {} unreadable: {}", page, e);
                    index.mark_failed(page);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if index.failed_pages.len() == pages as usize => Err(e),
            _ => {
                debug!("Index: {}", index);
                Ok(index)
            }
        }
    }

    /// Capture a finger and download the raw image
    pub async fn capture_image(&self) -> Result<FingerprintImage> {
        self.capture_image_with(&CancellationToken::new()).await
    }

    /// [`capture_image`](Self::capture_image) that stops when `cancel` fires
    pub async fn capture_image_with(&self, cancel: &CancellationToken) -> Result<FingerprintImage> {
        let mut link = self.link().await?;
        let timeouts = link.config().timeouts;

        capture_on(&mut link).await?;

        let request = Download {
            trigger: Command::UpImage,
            args: Bytes::new(),
            expected: ExpectedSize::Exact(IMAGE_SIZE),
            overall: timeouts.image_transfer,
            inactivity: timeouts.image_inactivity,
        };
        let pixels = bulk::download(&mut link, &request, cancel).await?;

        Ok(FingerprintImage::new(pixels)?)
    }

    /// Download the template held in a character buffer
    pub async fn download_template(&self, buffer: u8) -> Result<Template> {
        self.download_template_with(buffer, &CancellationToken::new())
            .await
    }

    /// [`download_template`](Self::download_template) that stops when `cancel` fires
    pub async fn download_template_with(&self, buffer: u8, cancel: &CancellationToken) -> Result<Template> {
        let mut link = self.link().await?;
        download_template_on(&mut link, buffer, cancel).await
    }

    /// Load a library page and download it
    pub async fn download_template_from_page(&self, page: u16, buffer: u8) -> Result<Template> {
        let mut link = self.link().await?;
        load_on(&mut link, buffer, page).await?;
        download_template_on(&mut link, buffer, &CancellationToken::new()).await
    }

    /// Upload a template into a character buffer
    pub async fn upload_template(&self, buffer: u8, template: &Template) -> Result<UploadAck> {
        self.upload_template_with(buffer, template, &CancellationToken::new())
            .await
    }

    /// [`upload_template`](Self::upload_template) that stops when `cancel` fires
    pub async fn upload_template_with(
        &self,
        buffer: u8,
        template: &Template,
        cancel: &CancellationToken,
    ) -> Result<UploadAck> {
        let mut link = self.link().await?;
        bulk::upload(&mut link, buffer, template.as_bytes(), cancel).await
    }

    /// Upload a template and store it at `page`
    pub async fn upload_template_to_page(&self, template: &Template, page: u16, buffer: u8) -> Result<UploadAck> {
        let mut link = self.link().await?;
        link.state().check_pages(page, 1)?;

        let ack = bulk::upload(&mut link, buffer, template.as_bytes(), &CancellationToken::new()).await?;
        store_on(&mut link, buffer, page).await?;
        Ok(ack)
    }

    /// Ask the module to abort what it is doing
    ///
    /// Waits for the channel like any other command. Use a
    /// [`CancellationToken`] to abandon a transfer from the host side.
    pub async fn cancel(&self) -> Result<()> {
        let mut link = self.link().await?;
        let timeout = link.config().timeouts.command;

        link.command(Command::Cancel, &[], timeout).await?;
        Ok(())
    }

    async fn link(&self) -> Result<ChannelGuard<'_>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.channel.lock().await
    }
}

async fn verify_password_on(link: &mut ChannelGuard<'_>, password: u32) -> Result<()> {
    let timeout = link.config().timeouts.command;
    link.command(Command::VerifyPassword, &args::password(password), timeout)
        .await?;
    debug!("Password verified");
    Ok(())
}

async fn recover_address_on(link: &mut ChannelGuard<'_>, password: u32) -> Result<u32> {
    let state = link.state();
    let previous = state.target_address();

    info!("Recovering module address (was 0x{:08X})...", previous);
    state.set_target_address(BROADCAST_ADDRESS);
    link.purge().await?;

    if let Err(e) = verify_password_on(link, password).await {
        state.set_target_address(previous);
        return Err(match e {
            Error::Device { code, .. } => Error::Recovery(format!("password rejected at broadcast: {}", code)),
            Error::Timeout { .. } => Error::Recovery("no answer at broadcast".into()),
            other => other,
        });
    }

    let reply = match parameters_reply(link).await {
        Ok(reply) => reply,
        Err(e) => {
            state.set_target_address(previous);
            return Err(Error::Recovery(format!("parameter query failed: {}", e)));
        }
    };

    let address = reply.address;
    if address == BROADCAST_ADDRESS {
        state.set_target_address(previous);
        return Err(Error::Recovery("module answered from the broadcast address".into()));
    }
    state.set_target_address(address);
    info!("Module address is 0x{:08X}", address);

    if let Err(e) = adopt_parameters(link, &reply) {
        warn!(
            packet_size = state.packet_size(),
            capacity = state.capacity(),
            "Keeping current settings, parameter block unreadable: {}",
            e
        );
    }

    Ok(address)
}

/// Purge, then ReadSysParams and check the confirmation code
async fn parameters_reply(link: &mut ChannelGuard<'_>) -> Result<Frame> {
    let timeout = link.config().timeouts.parameters;

    link.purge().await?;
    let ack = link.exchange(Command::ReadSysParams, &[], timeout).await?;
    check_ack(Command::ReadSysParams, &ack)?;
    Ok(ack)
}

/// Parse a ReadSysParams reply and adopt its packet size and capacity
fn adopt_parameters(link: &ChannelGuard<'_>, reply: &Frame) -> Result<SystemParameters> {
    let params = SystemParameters::parse(&reply.ack_results())?;
    let state = link.state();
    state.set_packet_size(params.packet_size.bytes());
    state.set_capacity(params.capacity);

    debug!("Parameters: {}", params);
    Ok(params)
}

async fn read_parameters_on(link: &mut ChannelGuard<'_>) -> Result<SystemParameters> {
    let reply = parameters_reply(link).await?;
    adopt_parameters(link, &reply)
}

async fn capture_on(link: &mut ChannelGuard<'_>) -> Result<()> {
    let timeout = link.config().timeouts.command;

    link.purge().await?;
    link.channel().emit(StatusEvent::PlaceFinger);

    match link.command(Command::GenImg, &[], timeout).await {
        Ok(_) => {
            link.channel().emit(StatusEvent::ImageCaptured);
            Ok(())
        }
        Err(e) => Err(rejected(link, e)),
    }
}

async fn extract_on(link: &mut ChannelGuard<'_>, buffer: u8) -> Result<()> {
    let timeout = link.config().timeouts.command;

    match link.command(Command::Img2Tz, &args::buffer(buffer)?, timeout).await {
        Ok(_) => {
            link.channel().emit(StatusEvent::FeaturesExtracted { buffer });
            Ok(())
        }
        Err(e) => Err(rejected(link, e)),
    }
}

async fn merge_on(link: &mut ChannelGuard<'_>) -> Result<()> {
    let timeout = link.config().timeouts.command;

    match link.command(Command::RegModel, &[], timeout).await {
        Ok(_) => {
            link.channel().emit(StatusEvent::ModelReady);
            Ok(())
        }
        Err(e) => Err(rejected(link, e)),
    }
}

async fn store_on(link: &mut ChannelGuard<'_>, buffer: u8, page: u16) -> Result<()> {
    link.state().check_pages(page, 1)?;
    let timeout = link.config().timeouts.database;

    link.command(Command::Store, &args::buffer_page(buffer, page)?, timeout)
        .await?;

    debug!("Buffer {} stored at page {}", buffer, page);
    link.channel().emit(StatusEvent::TemplateStored { page });
    Ok(())
}

async fn load_on(link: &mut ChannelGuard<'_>, buffer: u8, page: u16) -> Result<()> {
    link.state().check_pages(page, 1)?;
    let timeout = link.config().timeouts.database;

    link.command(Command::LoadChar, &args::buffer_page(buffer, page)?, timeout)
        .await?;
    Ok(())
}

async fn search_on(link: &mut ChannelGuard<'_>, buffer: u8, start: u16, count: u16) -> Result<Option<SearchMatch>> {
    link.state().check_pages(start, count)?;
    let timeout = link.config().timeouts.database;

    match link.command(Command::Search, &args::search(buffer, start, count)?, timeout).await {
        Ok(results) => {
            let hit = SearchMatch::parse(&results)?;
            debug!("Search hit: {}", hit);
            link.channel().emit(StatusEvent::Matched {
                page: hit.page,
                score: hit.score,
            });
            Ok(Some(hit))
        }
        Err(Error::Device {
            code: ConfirmationCode::NotFound,
            ..
        }) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn read_index_page_on(link: &mut ChannelGuard<'_>, page: u8) -> Result<BTreeSet<u16>> {
    let timeout = link.config().timeouts.database;

    let bitmap = link
        .command(Command::ReadIndexTable, &args::index_page(page), timeout)
        .await?;
    Ok(TemplateIndex::decode_page(page, &bitmap)?)
}

async fn download_template_on(
    link: &mut ChannelGuard<'_>,
    buffer: u8,
    cancel: &CancellationToken,
) -> Result<Template> {
    let timeouts = link.config().timeouts;
    let request = Download {
        trigger: Command::UpChar,
        args: args::buffer(buffer)?,
        expected: ExpectedSize::Open,
        overall: timeouts.template_transfer,
        inactivity: timeouts.template_inactivity,
    };

    let data = bulk::download(link, &request, cancel).await?;
    let template = Template::new(data)?;
    if !template.is_plausible() {
        warn!("Template download cut short at {} bytes", template.len());
        return Err(Error::ImplausibleTemplate { size: template.len() });
    }

    debug!("Downloaded {}", template);
    Ok(template)
}

/// Publish a device rejection before handing the error back
fn rejected(link: &ChannelGuard<'_>, e: Error) -> Error {
    if let Error::Device { operation, code } = &e {
        link.channel().emit(StatusEvent::DeviceRejected {
            operation: *operation,
            code: *code,
        });
    }
    e
}
