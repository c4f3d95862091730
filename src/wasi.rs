//! A subset of WASI preview1 (`wasi_snapshot_preview1`), implemented as host functions.
//!
//! Call [`Wasi::link`] to allocate the functions in a [`Store`] and get them back keyed by
//! import name, ready for [`Linker::link`](crate::Linker::link). Functions outside the subset
//! are not provided.
//!
//! `proc_exit(n)` stops execution with the host trap `exit:n`. [`exit_code`] recognizes that
//! trap; nothing else in the crate interprets it.

use {
    crate::{
        extern_val::ExternVal,
        func::{Caller, FuncType},
        index::MemIdx,
        linker::ImportName,
        mem::MemInst,
        store::Store,
        trap::Trap,
        val::{Val, ValType},
    },
    parking_lot::Mutex,
    std::{
        collections::HashMap,
        fs::{self, File, OpenOptions},
        io::{self, Read, Seek, SeekFrom, Write},
        path::{Component, Path, PathBuf},
        sync::Arc,
        time::{Instant, SystemTime, UNIX_EPOCH},
    },
    tracing::{debug, trace},
};

/// The module name WASI preview1 functions are imported from.
pub const MODULE_NAME: &str = "wasi_snapshot_preview1";

/// Returns the exit code carried by a trap raised by `proc_exit`, if `trap` is one.
pub fn exit_code(trap: &Trap) -> Option<i32> {
    match trap {
        Trap::Host(reason) => reason.strip_prefix("exit:")?.parse().ok(),
        _ => None,
    }
}

/// Splits a `host[:guest]` directory mapping. Without a guest path, the directory is exposed
/// under its host path.
pub fn parse_map_dir(mapping: &str) -> (PathBuf, String) {
    match mapping.split_once(':') {
        Some((host, guest)) => (PathBuf::from(host), guest.to_string()),
        None => (PathBuf::from(mapping), mapping.to_string()),
    }
}

/// A WASI error number.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Errno(pub u16);

impl Errno {
    pub const SUCCESS: Self = Self(0);
    pub const ACCES: Self = Self(2);
    pub const BADF: Self = Self(8);
    pub const EXIST: Self = Self(20);
    pub const FAULT: Self = Self(21);
    pub const INVAL: Self = Self(28);
    pub const IO: Self = Self(29);
    pub const ISDIR: Self = Self(31);
    pub const NOENT: Self = Self(44);
    pub const NOTDIR: Self = Self(54);
    pub const SPIPE: Self = Self(70);
    pub const NOTCAPABLE: Self = Self(76);
}

impl From<Trap> for Errno {
    fn from(_: Trap) -> Self {
        Self::FAULT
    }
}

impl From<io::Error> for Errno {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NOENT,
            io::ErrorKind::PermissionDenied => Self::ACCES,
            io::ErrorKind::AlreadyExists => Self::EXIST,
            io::ErrorKind::InvalidInput => Self::INVAL,
            _ => Self::IO,
        }
    }
}

const FILETYPE_CHARACTER_DEVICE: u8 = 2;
const FILETYPE_DIRECTORY: u8 = 3;
const FILETYPE_REGULAR_FILE: u8 = 4;

const OFLAGS_CREAT: u32 = 1 << 0;
const OFLAGS_DIRECTORY: u32 = 1 << 1;
const OFLAGS_EXCL: u32 = 1 << 2;
const OFLAGS_TRUNC: u32 = 1 << 3;

const FDFLAGS_APPEND: u32 = 1 << 0;

const RIGHTS_FD_WRITE: u64 = 1 << 6;

/// The settings of a WASI environment: arguments, environment variables and preopened
/// directories.
#[derive(Clone, Debug, Default)]
pub struct Wasi {
    args: Vec<String>,
    env: Vec<String>,
    preopens: Vec<(PathBuf, String)>,
}

impl Wasi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends arguments. The first argument is conventionally the program name.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push(format!("{}={}", key, value));
        self
    }

    /// Exposes the host directory `host` to the guest under the path `guest`.
    pub fn preopen_dir(mut self, host: impl Into<PathBuf>, guest: impl Into<String>) -> Self {
        self.preopens.push((host.into(), guest.into()));
        self
    }

    /// Allocates the WASI functions in `store` and returns them keyed by import name.
    ///
    /// All returned functions share one set of file descriptors.
    pub fn link(self, store: &mut Store) -> HashMap<ImportName, ExternVal> {
        let state = Arc::new(Mutex::new(WasiState::new(self)));
        let mut externs = HashMap::new();
        for &(name, params, syscall) in SYSCALLS {
            let state = state.clone();
            let type_ = FuncType::new(params.iter().copied(), [ValType::I32]);
            let func = store.alloc_host_func(name, type_, move |caller, args| {
                let errno = match memory(caller) {
                    Some(mem) => match syscall(&mut state.lock(), mem, args) {
                        Ok(()) => Errno::SUCCESS,
                        Err(errno) => errno,
                    },
                    None => Errno::FAULT,
                };
                trace!(syscall = name, errno = errno.0, "wasi call");
                Ok(vec![Val::I32(i32::from(errno.0))])
            });
            externs.insert(ImportName::new(MODULE_NAME, name), ExternVal::Func(func));
        }

        let proc_exit = store.alloc_host_func(
            "proc_exit",
            FuncType::new([ValType::I32], []),
            |_, args| {
                let code = arg_u32(args, 0) as i32;
                debug!(code, "proc_exit");
                Err(Trap::host(format!("exit:{}", code)))
            },
        );
        externs.insert(ImportName::new(MODULE_NAME, "proc_exit"), ExternVal::Func(proc_exit));
        let sched_yield = store.alloc_host_func(
            "sched_yield",
            FuncType::new([], [ValType::I32]),
            |_, _| Ok(vec![Val::I32(0)]),
        );
        externs.insert(ImportName::new(MODULE_NAME, "sched_yield"), ExternVal::Func(sched_yield));
        externs
    }
}

#[derive(Debug)]
enum Fd {
    Stdin,
    Stdout,
    Stderr,
    Dir {
        host: PathBuf,
        /// The guest path, for preopened directories.
        preopen: Option<String>,
    },
    File(File),
}

impl Fd {
    fn filetype(&self) -> u8 {
        match self {
            Self::Stdin | Self::Stdout | Self::Stderr => FILETYPE_CHARACTER_DEVICE,
            Self::Dir { .. } => FILETYPE_DIRECTORY,
            Self::File(_) => FILETYPE_REGULAR_FILE,
        }
    }
}

#[derive(Debug)]
struct WasiState {
    args: Vec<String>,
    env: Vec<String>,
    fds: Vec<Option<Fd>>,
    start: Instant,
}

impl WasiState {
    fn new(wasi: Wasi) -> Self {
        let mut fds = vec![Some(Fd::Stdin), Some(Fd::Stdout), Some(Fd::Stderr)];
        fds.extend(wasi.preopens.into_iter().map(|(host, guest)| {
            Some(Fd::Dir {
                host,
                preopen: Some(guest),
            })
        }));
        Self {
            args: wasi.args,
            env: wasi.env,
            fds,
            start: Instant::now(),
        }
    }

    fn fd(&mut self, fd: u32) -> Result<&mut Fd, Errno> {
        self.fds
            .get_mut(fd as usize)
            .and_then(Option::as_mut)
            .ok_or(Errno::BADF)
    }

    fn insert(&mut self, fd: Fd) -> u32 {
        match self.fds.iter().position(Option::is_none) {
            Some(idx) => {
                self.fds[idx] = Some(fd);
                idx as u32
            }
            None => {
                self.fds.push(Some(fd));
                (self.fds.len() - 1) as u32
            }
        }
    }
}

type Syscall = fn(&mut WasiState, &mut MemInst, &[Val]) -> Result<(), Errno>;

use crate::val::ValType::{I32, I64};

const SYSCALLS: &[(&str, &[ValType], Syscall)] = &[
    ("args_get", &[I32, I32], args_get),
    ("args_sizes_get", &[I32, I32], args_sizes_get),
    ("environ_get", &[I32, I32], environ_get),
    ("environ_sizes_get", &[I32, I32], environ_sizes_get),
    ("clock_res_get", &[I32, I32], clock_res_get),
    ("clock_time_get", &[I32, I64, I32], clock_time_get),
    ("fd_close", &[I32], fd_close),
    ("fd_fdstat_get", &[I32, I32], fd_fdstat_get),
    ("fd_filestat_get", &[I32, I32], fd_filestat_get),
    ("fd_prestat_get", &[I32, I32], fd_prestat_get),
    ("fd_prestat_dir_name", &[I32, I32, I32], fd_prestat_dir_name),
    ("fd_read", &[I32, I32, I32, I32], fd_read),
    ("fd_seek", &[I32, I64, I32, I32], fd_seek),
    ("fd_tell", &[I32, I32], fd_tell),
    ("fd_write", &[I32, I32, I32, I32], fd_write),
    (
        "path_open",
        &[I32, I32, I32, I32, I32, I64, I64, I32, I32],
        path_open,
    ),
    ("random_get", &[I32, I32], random_get),
];

fn memory<'a>(caller: &'a mut Caller<'_>) -> Option<&'a mut MemInst> {
    let addr = caller.mem_addr(MemIdx::new(0))?;
    caller.store_mut().mem_mut(addr)
}

fn arg_u32(args: &[Val], idx: usize) -> u32 {
    args.get(idx).and_then(|arg| arg.to_i32()).unwrap_or(0) as u32
}

fn arg_u64(args: &[Val], idx: usize) -> u64 {
    args.get(idx).and_then(|arg| arg.to_i64()).unwrap_or(0) as u64
}

/// Returns the pointer argument at `idx`, widened so that offsets never overflow.
fn arg_ptr(args: &[Val], idx: usize) -> u64 {
    u64::from(arg_u32(args, idx))
}

fn read_u32(mem: &MemInst, ptr: u64) -> Result<u32, Errno> {
    let mut bytes = [0; 4];
    mem.read(ptr, &mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn write_u32(mem: &mut MemInst, ptr: u64, val: u32) -> Result<(), Errno> {
    Ok(mem.write(ptr, &val.to_le_bytes())?)
}

fn write_u64(mem: &mut MemInst, ptr: u64, val: u64) -> Result<(), Errno> {
    Ok(mem.write(ptr, &val.to_le_bytes())?)
}

fn read_bytes(mem: &MemInst, ptr: u64, len: u32) -> Result<Vec<u8>, Errno> {
    let mut bytes = vec![0; len as usize];
    mem.read(ptr, &mut bytes)?;
    Ok(bytes)
}

/// Reads a vector of `(pointer, length)` buffer descriptors.
fn read_iovs(mem: &MemInst, ptr: u64, len: u32) -> Result<Vec<(u64, u32)>, Errno> {
    (0..u64::from(len))
        .map(|idx| {
            let iov = ptr + 8 * idx;
            Ok((u64::from(read_u32(mem, iov)?), read_u32(mem, iov + 4)?))
        })
        .collect()
}

fn write_strings(mem: &mut MemInst, strings: &[String], ptrs: u64, buf: u64) -> Result<(), Errno> {
    let mut offset = buf;
    for (idx, string) in strings.iter().enumerate() {
        write_u32(mem, ptrs + 4 * idx as u64, offset as u32)?;
        mem.write(offset, string.as_bytes())?;
        mem.write(offset + string.len() as u64, &[0])?;
        offset += string.len() as u64 + 1;
    }
    Ok(())
}

fn write_sizes(mem: &mut MemInst, strings: &[String], count_ptr: u64, size_ptr: u64) -> Result<(), Errno> {
    let size: usize = strings.iter().map(|string| string.len() + 1).sum();
    write_u32(mem, count_ptr, strings.len() as u32)?;
    write_u32(mem, size_ptr, size as u32)
}

fn args_get(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    write_strings(mem, &state.args, arg_ptr(args, 0), arg_ptr(args, 1))
}

fn args_sizes_get(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    write_sizes(mem, &state.args, arg_ptr(args, 0), arg_ptr(args, 1))
}

fn environ_get(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    write_strings(mem, &state.env, arg_ptr(args, 0), arg_ptr(args, 1))
}

fn environ_sizes_get(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    write_sizes(mem, &state.env, arg_ptr(args, 0), arg_ptr(args, 1))
}

fn clock_res_get(_: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    if arg_u32(args, 0) > 3 {
        return Err(Errno::INVAL);
    }
    write_u64(mem, arg_ptr(args, 1), 1_000)
}

fn clock_time_get(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    let nanos = match arg_u32(args, 0) {
        0 => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Errno::IO)?
            .as_nanos(),
        1..=3 => state.start.elapsed().as_nanos(),
        _ => return Err(Errno::INVAL),
    };
    write_u64(mem, arg_ptr(args, 2), nanos as u64)
}

fn fd_close(state: &mut WasiState, _: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    state
        .fds
        .get_mut(arg_u32(args, 0) as usize)
        .and_then(Option::take)
        .map(|_| ())
        .ok_or(Errno::BADF)
}

fn fd_fdstat_get(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    let filetype = state.fd(arg_u32(args, 0))?.filetype();
    let mut fdstat = [0u8; 24];
    fdstat[0] = filetype;
    fdstat[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
    fdstat[16..24].copy_from_slice(&u64::MAX.to_le_bytes());
    Ok(mem.write(arg_ptr(args, 1), &fdstat)?)
}

fn fd_filestat_get(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    let fd = state.fd(arg_u32(args, 0))?;
    let metadata = match fd {
        Fd::File(file) => Some(file.metadata()?),
        Fd::Dir { host, .. } => Some(fs::metadata(host)?),
        _ => None,
    };
    let mut filestat = [0u8; 64];
    filestat[16] = fd.filetype();
    filestat[24..32].copy_from_slice(&1u64.to_le_bytes());
    if let Some(metadata) = metadata {
        let nanos = |time: io::Result<SystemTime>| {
            time.ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |duration| duration.as_nanos() as u64)
        };
        filestat[32..40].copy_from_slice(&metadata.len().to_le_bytes());
        filestat[40..48].copy_from_slice(&nanos(metadata.accessed()).to_le_bytes());
        filestat[48..56].copy_from_slice(&nanos(metadata.modified()).to_le_bytes());
        filestat[56..64].copy_from_slice(&nanos(metadata.modified()).to_le_bytes());
    }
    Ok(mem.write(arg_ptr(args, 1), &filestat)?)
}

fn preopen_name(state: &mut WasiState, fd: u32) -> Result<String, Errno> {
    match state.fd(fd)? {
        Fd::Dir {
            preopen: Some(name),
            ..
        } => Ok(name.clone()),
        _ => Err(Errno::BADF),
    }
}

fn fd_prestat_get(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    let name = preopen_name(state, arg_u32(args, 0))?;
    let ptr = arg_ptr(args, 1);
    mem.write(ptr, &[0, 0, 0, 0])?;
    write_u32(mem, ptr + 4, name.len() as u32)
}

fn fd_prestat_dir_name(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    let name = preopen_name(state, arg_u32(args, 0))?;
    let len = (arg_u32(args, 2) as usize).min(name.len());
    Ok(mem.write(arg_ptr(args, 1), &name.as_bytes()[..len])?)
}

fn fd_read(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    let fd = arg_u32(args, 0);
    let iovs = read_iovs(mem, arg_ptr(args, 1), arg_u32(args, 2))?;
    let mut total = 0u32;
    for (ptr, len) in iovs {
        let mut buf = vec![0; len as usize];
        let count = match state.fd(fd)? {
            Fd::Stdin => io::stdin().read(&mut buf)?,
            Fd::File(file) => file.read(&mut buf)?,
            Fd::Dir { .. } => return Err(Errno::ISDIR),
            Fd::Stdout | Fd::Stderr => return Err(Errno::BADF),
        };
        mem.write(ptr, &buf[..count])?;
        total += count as u32;
        if count < buf.len() {
            break;
        }
    }
    write_u32(mem, arg_ptr(args, 3), total)
}

fn fd_write(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    let fd = arg_u32(args, 0);
    let iovs = read_iovs(mem, arg_ptr(args, 1), arg_u32(args, 2))?;
    let mut total = 0u32;
    for (ptr, len) in iovs {
        let bytes = read_bytes(mem, ptr, len)?;
        match state.fd(fd)? {
            Fd::Stdout => io::stdout().write_all(&bytes)?,
            Fd::Stderr => io::stderr().write_all(&bytes)?,
            Fd::File(file) => file.write_all(&bytes)?,
            Fd::Dir { .. } => return Err(Errno::ISDIR),
            Fd::Stdin => return Err(Errno::BADF),
        }
        total += len;
    }
    if let Fd::Stdout = state.fd(fd)? {
        io::stdout().flush()?;
    }
    write_u32(mem, arg_ptr(args, 3), total)
}

fn fd_seek(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    let offset = arg_u64(args, 1) as i64;
    let pos = match arg_u32(args, 2) {
        0 => SeekFrom::Start(u64::try_from(offset).map_err(|_| Errno::INVAL)?),
        1 => SeekFrom::Current(offset),
        2 => SeekFrom::End(offset),
        _ => return Err(Errno::INVAL),
    };
    let new_offset = match state.fd(arg_u32(args, 0))? {
        Fd::File(file) => file.seek(pos)?,
        Fd::Dir { .. } => return Err(Errno::ISDIR),
        _ => return Err(Errno::SPIPE),
    };
    write_u64(mem, arg_ptr(args, 3), new_offset)
}

fn fd_tell(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    let offset = match state.fd(arg_u32(args, 0))? {
        Fd::File(file) => file.stream_position()?,
        Fd::Dir { .. } => return Err(Errno::ISDIR),
        _ => return Err(Errno::SPIPE),
    };
    write_u64(mem, arg_ptr(args, 1), offset)
}

/// Joins a guest path onto a directory, refusing anything that could leave it.
///
/// Symbolic links are followed as far as the path exists. The deepest existing ancestor
/// must still lie inside `dir` once they are resolved.
fn resolve(dir: &Path, path: &str) -> Result<PathBuf, Errno> {
    let mut resolved = dir.to_path_buf();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return Err(Errno::NOTCAPABLE),
        }
    }
    let Ok(root) = dir.canonicalize() else {
        return Ok(resolved);
    };
    let existing = resolved
        .ancestors()
        .find_map(|ancestor| ancestor.canonicalize().ok());
    match existing {
        Some(existing) if existing.starts_with(&root) => Ok(resolved),
        _ => Err(Errno::NOTCAPABLE),
    }
}

fn path_open(state: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    let dir = match state.fd(arg_u32(args, 0))? {
        Fd::Dir { host, .. } => host.clone(),
        _ => return Err(Errno::NOTDIR),
    };
    let path = read_bytes(mem, arg_ptr(args, 2), arg_u32(args, 3))?;
    let path = String::from_utf8(path).map_err(|_| Errno::INVAL)?;
    let host = resolve(&dir, &path)?;
    debug!(%path, host = %host.display(), "path_open");
    let oflags = arg_u32(args, 4);
    let rights = arg_u64(args, 5);
    let fdflags = arg_u32(args, 7);

    let fd = if oflags & OFLAGS_DIRECTORY != 0 || host.is_dir() {
        if !host.is_dir() {
            return Err(Errno::NOTDIR);
        }
        Fd::Dir {
            host,
            preopen: None,
        }
    } else {
        let write = rights & RIGHTS_FD_WRITE != 0 || oflags & (OFLAGS_CREAT | OFLAGS_TRUNC) != 0;
        let mut options = OpenOptions::new();
        options
            .read(true)
            .write(write)
            .append(fdflags & FDFLAGS_APPEND != 0)
            .create(oflags & OFLAGS_CREAT != 0)
            .truncate(oflags & OFLAGS_TRUNC != 0);
        if oflags & OFLAGS_EXCL != 0 {
            options.create_new(true);
        }
        Fd::File(options.open(&host)?)
    };
    let fd = state.insert(fd);
    write_u32(mem, arg_ptr(args, 8), fd)
}

fn random_get(_: &mut WasiState, mem: &mut MemInst, args: &[Val]) -> Result<(), Errno> {
    let bytes = mem.slice_mut(arg_ptr(args, 0), u64::from(arg_u32(args, 1)))?;
    getrandom::getrandom(bytes).map_err(|_| Errno::IO)
}

#[cfg(test)]
mod tests {
    use {super::*, crate::mem::MemType};

    fn state(args: &[&str]) -> WasiState {
        WasiState::new(Wasi::new().args(args.iter().copied()))
    }

    #[test]
    fn recognizes_exit_traps_only() {
        assert_eq!(exit_code(&Trap::host("exit:3")), Some(3));
        assert_eq!(exit_code(&Trap::host("exit:-1")), Some(-1));
        assert_eq!(exit_code(&Trap::host("exit")), None);
        assert_eq!(exit_code(&Trap::Unreachable), None);
    }

    #[test]
    fn splits_directory_mappings() {
        assert_eq!(parse_map_dir("/tmp:/data"), (PathBuf::from("/tmp"), "/data".to_string()));
        assert_eq!(parse_map_dir("."), (PathBuf::from("."), ".".to_string()));
    }

    #[test]
    fn paths_cannot_escape_their_directory() {
        let dir = Path::new("/sandbox");
        assert_eq!(resolve(dir, "a/./b"), Ok(PathBuf::from("/sandbox/a/b")));
        assert_eq!(resolve(dir, "../etc/passwd"), Err(Errno::NOTCAPABLE));
        assert_eq!(resolve(dir, "/etc/passwd"), Err(Errno::NOTCAPABLE));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_cannot_escape_their_directory() {
        let outside = tempfile::tempdir().unwrap();
        let sandbox = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), sandbox.path().join("link")).unwrap();
        fs::create_dir(sandbox.path().join("inner")).unwrap();
        assert_eq!(resolve(sandbox.path(), "link/secret"), Err(Errno::NOTCAPABLE));
        assert_eq!(resolve(sandbox.path(), "link"), Err(Errno::NOTCAPABLE));
        assert_eq!(
            resolve(sandbox.path(), "inner/new.txt"),
            Ok(sandbox.path().join("inner/new.txt"))
        );
    }

    #[test]
    fn opens_files_inside_a_preopened_directory() {
        let sandbox = tempfile::tempdir().unwrap();
        fs::write(sandbox.path().join("hello.txt"), b"hi").unwrap();
        let mut state = WasiState::new(Wasi::new().preopen_dir(sandbox.path(), "/data"));
        let mut mem = MemInst::new(MemType::new(1, None));
        let open = |len: i32| {
            [
                Val::I32(3),
                Val::I32(0),
                Val::I32(100),
                Val::I32(len),
                Val::I32(0),
                Val::I64(0),
                Val::I64(0),
                Val::I32(0),
                Val::I32(200),
            ]
        };

        mem.bytes_mut()[100..109].copy_from_slice(b"hello.txt");
        assert_eq!(path_open(&mut state, &mut mem, &open(9)), Ok(()));
        assert_eq!(read_u32(&mem, 200), Ok(4));
        assert!(matches!(state.fd(4), Ok(Fd::File(_))));

        mem.bytes_mut()[100..108].copy_from_slice(b"../x.txt");
        assert_eq!(path_open(&mut state, &mut mem, &open(8)), Err(Errno::NOTCAPABLE));
    }

    #[test]
    fn random_bytes_are_bounds_checked() {
        let mut state = state(&[]);
        let mut mem = MemInst::new(MemType::new(1, None));
        let huge = [Val::I32(0), Val::I32(-1)];
        assert_eq!(random_get(&mut state, &mut mem, &huge), Err(Errno::FAULT));
        let tail = [Val::I32(65_528), Val::I32(16)];
        assert_eq!(random_get(&mut state, &mut mem, &tail), Err(Errno::FAULT));
        let fits = [Val::I32(65_528), Val::I32(8)];
        assert_eq!(random_get(&mut state, &mut mem, &fits), Ok(()));
    }

    #[test]
    fn writes_arguments_into_memory() {
        let mut state = state(&["prog", "x"]);
        let mut mem = MemInst::new(MemType::new(1, None));
        let sizes = [Val::I32(0), Val::I32(4)];
        assert_eq!(args_sizes_get(&mut state, &mut mem, &sizes), Ok(()));
        assert_eq!(read_u32(&mem, 0), Ok(2));
        assert_eq!(read_u32(&mem, 4), Ok(7));

        let ptrs = [Val::I32(16), Val::I32(32)];
        assert_eq!(args_get(&mut state, &mut mem, &ptrs), Ok(()));
        assert_eq!(read_u32(&mem, 16), Ok(32));
        assert_eq!(read_u32(&mem, 20), Ok(37));
        assert_eq!(read_bytes(&mem, 32, 7), Ok(b"prog\0x\0".to_vec()));
    }

    #[test]
    fn out_of_bounds_pointers_fault() {
        let mut state = state(&["prog"]);
        let mut mem = MemInst::new(MemType::new(1, None));
        let sizes = [Val::I32(-1), Val::I32(0)];
        assert_eq!(args_sizes_get(&mut state, &mut mem, &sizes), Err(Errno::FAULT));
    }

    #[test]
    fn preopened_directories_are_numbered_after_stdio() {
        let mut state = WasiState::new(Wasi::new().preopen_dir("/tmp", "/data"));
        let mut mem = MemInst::new(MemType::new(1, None));
        assert_eq!(fd_prestat_get(&mut state, &mut mem, &[Val::I32(3), Val::I32(0)]), Ok(()));
        assert_eq!(read_u32(&mem, 4), Ok(5));
        assert_eq!(fd_prestat_get(&mut state, &mut mem, &[Val::I32(1), Val::I32(0)]), Err(Errno::BADF));
        assert_eq!(fd_close(&mut state, &mut mem, &[Val::I32(3)]), Ok(()));
        assert_eq!(fd_close(&mut state, &mut mem, &[Val::I32(3)]), Err(Errno::BADF));
    }
}
