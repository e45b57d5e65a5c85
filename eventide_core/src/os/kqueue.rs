#![cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]

//! Kqueue backend for the BSD family.  Mirrors the Linux epoll variant to
//! maintain a consistent `Poller` surface: a descriptor's read/write mask is
//! expressed as two kevent filters.

use std::io::{Error, Result};
use std::os::unix::io::RawFd;

use super::poller::{Event, Poller};

#[derive(Debug)]
pub struct Kqueue {
    kq: RawFd,
}

impl Kqueue {
    pub fn new() -> Result<Self> {
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(Error::last_os_error());
        }
        Ok(Kqueue { kq })
    }

    fn change(&self, fd: RawFd, filter: i16, flags: u16) -> Result<()> {
        let change = libc::kevent {
            ident: fd as _,
            filter,
            flags,
            fflags: 0,
            data: 0,
            udata: std::ptr::null_mut(),
        };
        let res = unsafe {
            libc::kevent(self.kq, &change, 1, std::ptr::null_mut(), 0, std::ptr::null())
        };
        if res < 0 {
            return Err(Error::last_os_error());
        }
        Ok(())
    }

    fn apply(&self, fd: RawFd, readable: bool, writable: bool) -> Result<()> {
        // EV_ADD on a present filter updates it in place, so the same change
        // list serves both registration and mask widening.  Dropped filters
        // are deleted best-effort: ENOENT there only means the filter was
        // never armed.
        for (wanted, filter) in [(readable, libc::EVFILT_READ), (writable, libc::EVFILT_WRITE)] {
            if wanted {
                self.change(fd, filter, (libc::EV_ADD | libc::EV_ENABLE) as u16)?;
            } else {
                let _ = self.change(fd, filter, libc::EV_DELETE as u16);
            }
        }
        Ok(())
    }
}

impl Poller for Kqueue {
    fn add(&self, fd: RawFd, readable: bool, writable: bool) -> Result<()> {
        self.apply(fd, readable, writable)
    }

    fn modify(&self, fd: RawFd, readable: bool, writable: bool) -> Result<()> {
        self.apply(fd, readable, writable)
    }

    fn delete(&self, fd: RawFd) -> Result<()> {
        let _ = self.change(fd, libc::EVFILT_READ, libc::EV_DELETE as u16);
        let _ = self.change(fd, libc::EVFILT_WRITE, libc::EV_DELETE as u16);
        Ok(())
    }

    fn wait(&self, events: &mut [Event], timeout_ms: i32) -> Result<usize> {
        let mut raw: Vec<libc::kevent> = Vec::with_capacity(events.len());
        // SAFETY: kevent overwrites every entry up to the returned length and
        // nothing past that length is read.
        unsafe {
            raw.set_len(events.len());
        }
        let ts = libc::timespec {
            tv_sec: (timeout_ms / 1000) as _,
            tv_nsec: ((timeout_ms % 1000) * 1_000_000) as _,
        };
        let n = unsafe {
            libc::kevent(
                self.kq,
                std::ptr::null(),
                0,
                raw.as_mut_ptr(),
                raw.len() as i32,
                &ts,
            )
        };
        if n < 0 {
            return Err(Error::last_os_error());
        }
        for (dst, src) in events.iter_mut().zip(raw.iter().take(n as usize)) {
            dst.fd = src.ident as RawFd;
            dst.readable = src.filter == libc::EVFILT_READ;
            dst.writable = src.filter == libc::EVFILT_WRITE;
        }
        Ok(n as usize)
    }
}

impl Drop for Kqueue {
    fn drop(&mut self) {
        unsafe { libc::close(self.kq) };
    }
}
