//! Simulated AS608 module for scenario tests

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use as608::{Command, Frame, PacketKind, Transport};
use as608_core::constants::BROADCAST_ADDRESS;
use as608_core::StreamFramer;
use as608_types::{BaudRate, PacketSize, SecurityLevel, StatusRegister, SystemParameters};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Module behaviour, inspectable from the test
pub struct Module {
    /// Address the module answers at
    pub address: u32,
    pub password: u32,
    pub packet_size: PacketSize,
    pub capacity: u16,

    /// Confirmation codes to answer with, per command, before falling back
    /// to the default behaviour
    pub script: HashMap<u8, VecDeque<u8>>,

    /// Bytes sent for UpImage
    pub image: Vec<u8>,

    /// Terminate image and template streams with DataEnd
    pub end_marker: bool,

    /// Bytes sent for UpChar
    pub template: Vec<u8>,

    /// Acknowledge the last uploaded chunk
    pub ack_upload: bool,

    /// Bytes received through DownChar
    pub uploaded: Vec<u8>,
    pub uploading: bool,

    pub occupied: BTreeSet<u16>,
    pub search_hit: Option<(u16, u16)>,

    /// ReadSysParams block sent verbatim instead of the modelled one
    pub raw_parameters: Option<Vec<u8>>,

    /// Every frame the host wrote, in order
    pub log: Vec<Frame>,

    pub rx: VecDeque<u8>,
    pub framer: StreamFramer,
    pub connected: bool,
}

impl Default for Module {
    fn default() -> Self {
        Self {
            address: BROADCAST_ADDRESS,
            password: 0,
            packet_size: PacketSize::Bytes128,
            capacity: 300,
            script: HashMap::new(),
            image: Vec::new(),
            end_marker: true,
            template: Vec::new(),
            ack_upload: true,
            uploaded: Vec::new(),
            uploading: false,
            occupied: BTreeSet::new(),
            search_hit: None,
            raw_parameters: None,
            log: Vec::new(),
            rx: VecDeque::new(),
            framer: StreamFramer::new(),
            connected: false,
        }
    }
}

impl Module {
    /// Queue confirmation codes for a command
    pub fn script(&mut self, command: Command, codes: &[u8]) {
        self.script
            .entry(command as u8)
            .or_default()
            .extend(codes.iter().copied());
    }

    /// Command codes the host sent, in order
    pub fn commands(&self) -> Vec<u8> {
        self.log.iter().filter_map(Frame::command_code).collect()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    fn scripted(&mut self, code: u8) -> Option<u8> {
        self.script.get_mut(&code).and_then(VecDeque::pop_front)
    }

    fn reply(&mut self, payload: Vec<u8>) {
        let frame = Frame::with_payload(self.address, PacketKind::Ack, payload).unwrap();
        self.rx.extend(frame.encode().iter().copied());
    }

    fn stream(&mut self, data: Vec<u8>) {
        let size = self.packet_size.bytes();
        let chunks: Vec<_> = data.chunks(size).map(<[u8]>::to_vec).collect();
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.into_iter().enumerate() {
            let frame = Frame::data(self.address, chunk, self.end_marker && i == last).unwrap();
            self.rx.extend(frame.encode().iter().copied());
        }
    }

    fn parameters(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw_parameters {
            return raw.clone();
        }

        SystemParameters {
            status: StatusRegister::PASSWORD_VERIFIED,
            system_id: 0,
            capacity: self.capacity,
            security_level: SecurityLevel::default(),
            address: self.address,
            packet_size: self.packet_size,
            baud_rate: BaudRate::from_multiplier(6),
        }
        .to_bytes()
        .to_vec()
    }

    fn handle(&mut self, frame: Frame) {
        if frame.address != self.address && frame.address != BROADCAST_ADDRESS {
            // Not for us
            return;
        }

        match frame.kind {
            PacketKind::Command => self.handle_command(&frame),
            PacketKind::Data | PacketKind::DataEnd if self.uploading => {
                self.uploaded.extend_from_slice(&frame.payload);
                if frame.kind == PacketKind::DataEnd {
                    self.uploading = false;
                    if self.ack_upload {
                        self.reply(vec![0x00]);
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_command(&mut self, frame: &Frame) {
        let Some(code) = frame.command_code() else {
            return;
        };
        let args = frame.payload.slice(1..);

        if let Some(scripted) = self.scripted(code) {
            if scripted != 0x00 {
                self.reply(vec![scripted]);
                return;
            }
        }

        match Command::try_from(code) {
            Ok(Command::VerifyPassword) => {
                let given = u32::from_be_bytes([args[0], args[1], args[2], args[3]]);
                let status = if given == self.password { 0x00 } else { 0x13 };
                self.reply(vec![status]);
            }
            Ok(Command::ReadSysParams) => {
                let mut payload = vec![0x00];
                payload.extend(self.parameters());
                self.reply(payload);
            }
            Ok(Command::TemplateCount) => {
                let count = self.occupied.len() as u16;
                let mut payload = vec![0x00];
                payload.extend(count.to_be_bytes());
                self.reply(payload);
            }
            Ok(Command::ReadIndexTable) => {
                let page = args[0] as u16;
                let mut bitmap = [0u8; 32];
                for slot in self.occupied.iter().copied().filter(|s| s / 256 == page) {
                    let offset = slot % 256;
                    bitmap[(offset / 8) as usize] |= 1 << (offset % 8);
                }
                let mut payload = vec![0x00];
                payload.extend(bitmap);
                self.reply(payload);
            }
            Ok(Command::Search) => match self.search_hit {
                Some((page, score)) => {
                    let mut payload = vec![0x00];
                    payload.extend(page.to_be_bytes());
                    payload.extend(score.to_be_bytes());
                    self.reply(payload);
                }
                None => self.reply(vec![0x09]),
            },
            Ok(Command::UpImage) => {
                self.reply(vec![0x00]);
                let image = self.image.clone();
                self.stream(image);
            }
            Ok(Command::UpChar) => {
                self.reply(vec![0x00]);
                let template = self.template.clone();
                self.stream(template);
            }
            Ok(Command::DownChar) => {
                self.uploaded.clear();
                self.uploading = true;
                self.reply(vec![0x00]);
            }
            Ok(Command::SetSysParam) if args[0] == 6 => {
                if let Ok(size) = PacketSize::from_code(args[1] as u16) {
                    self.packet_size = size;
                }
                self.reply(vec![0x00]);
            }
            Ok(_) => self.reply(vec![0x00]),
            Err(_) => self.reply(vec![0x01]),
        }
    }
}

/// Transport end of the simulated module
#[derive(Clone, Default)]
pub struct SimulatedSensor {
    pub module: Arc<Mutex<Module>>,
}

impl SimulatedSensor {
    pub fn new(module: Module) -> Self {
        Self {
            module: Arc::new(Mutex::new(module)),
        }
    }

    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl Transport for SimulatedSensor {
    async fn connect(&mut self) -> as608_transport::Result<()> {
        self.module.lock().connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> as608_transport::Result<()> {
        self.module.lock().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.module.lock().connected
    }

    async fn send(&mut self, data: &[u8], _timeout: Duration) -> as608_transport::Result<()> {
        let mut module = self.module.lock();
        module.framer.push(data);
        while let Some(frame) = module.framer.next_frame() {
            module.log.push(frame.clone());
            module.handle(frame);
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> as608_transport::Result<usize> {
        let n = {
            let mut module = self.module.lock();
            // A UART hands over a few dozen bytes at a time
            let n = module.rx.len().min(buf.len()).min(64);
            for (slot, byte) in buf.iter_mut().zip(module.rx.drain(..n)) {
                *slot = byte;
            }
            n
        };

        if n == 0 {
            tokio::time::sleep(timeout).await;
        }
        Ok(n)
    }

    async fn purge(&mut self) -> as608_transport::Result<()> {
        self.module.lock().rx.clear();
        Ok(())
    }

    fn remote_addr(&self) -> String {
        "simulated".into()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
