//! 安全邮件 FFI 绑定
//!
//! 提供 C ABI 兼容的接口，供其他语言调用。
//!
//! 所有字符串输出均写入调用方提供的缓冲区并以 NUL 结尾：
//! 调用前 `*out_len` 为缓冲区容量，成功后为写入长度（不含 NUL）；
//! 容量不足时返回 `SMAIL_ERR_BUFFER_TOO_SMALL`，`*out_len` 为所需容量。

use std::ffi::{c_char, c_int, c_uchar, c_ulong, CStr};
use std::ptr;
use std::slice;

use secure_mail_core::codec::{base64_decode, base64_encode};
use secure_mail_core::keys::fingerprint;
use secure_mail_core::{Decrypted, Error, KeyPairProvider, MessageCipher};

/// 错误码定义
pub const SMAIL_OK: c_int = 0;
/// 解密失败，输出为占位文本
pub const SMAIL_UNDECRYPTABLE: c_int = 1;
pub const SMAIL_ERR_NULL_PTR: c_int = -1;
pub const SMAIL_ERR_INVALID_PARAM: c_int = -2;
pub const SMAIL_ERR_CRYPTO: c_int = -3;
pub const SMAIL_ERR_KEY_FORMAT: c_int = -4;
pub const SMAIL_ERR_ENCODING: c_int = -5;
pub const SMAIL_ERR_PAYLOAD_TOO_LARGE: c_int = -6;
pub const SMAIL_ERR_BUFFER_TOO_SMALL: c_int = -7;

fn error_code(err: &Error) -> c_int {
    match err {
        Error::KeyFormat(_) => SMAIL_ERR_KEY_FORMAT,
        Error::Decode(_) => SMAIL_ERR_ENCODING,
        Error::PayloadTooLarge { .. } => SMAIL_ERR_PAYLOAD_TOO_LARGE,
        Error::InvalidParam(_) => SMAIL_ERR_INVALID_PARAM,
        _ => SMAIL_ERR_CRYPTO,
    }
}

/// 读取 C 字符串
///
/// # Safety
/// `s` 必须非空且指向以 NUL 结尾的字符串
unsafe fn read_str<'a>(s: *const c_char) -> Result<&'a str, c_int> {
    CStr::from_ptr(s).to_str().map_err(|_| SMAIL_ERR_ENCODING)
}

/// 写入以 NUL 结尾的字符串
///
/// # Safety
/// `out` 至少有 `*out_len` 字节可写
unsafe fn write_str(value: &str, out: *mut c_char, out_len: *mut c_ulong) -> c_int {
    let bytes = value.as_bytes();
    if bytes.contains(&0) {
        return SMAIL_ERR_ENCODING;
    }
    let required = bytes.len() + 1;
    if (*out_len as usize) < required {
        *out_len = required as c_ulong;
        return SMAIL_ERR_BUFFER_TOO_SMALL;
    }
    ptr::copy_nonoverlapping(bytes.as_ptr(), out as *mut u8, bytes.len());
    *out.add(bytes.len()) = 0;
    *out_len = bytes.len() as c_ulong;
    SMAIL_OK
}

/// 写入二进制数据
///
/// # Safety
/// `out` 至少有 `*out_len` 字节可写
unsafe fn write_bytes(data: &[u8], out: *mut c_uchar, out_len: *mut c_ulong) -> c_int {
    if (*out_len as usize) < data.len() {
        *out_len = data.len() as c_ulong;
        return SMAIL_ERR_BUFFER_TOO_SMALL;
    }
    ptr::copy_nonoverlapping(data.as_ptr(), out, data.len());
    *out_len = data.len() as c_ulong;
    SMAIL_OK
}

/// 生成 RSA-2048 密钥对，输出 Base64 编码的 SPKI 公钥与 PKCS#8 私钥
#[no_mangle]
pub extern "C" fn smail_keypair_generate(
    out_public: *mut c_char,
    public_len: *mut c_ulong,
    out_private: *mut c_char,
    private_len: *mut c_ulong,
) -> c_int {
    if out_public.is_null() || public_len.is_null() || out_private.is_null() || private_len.is_null()
    {
        return SMAIL_ERR_NULL_PTR;
    }

    let exported = KeyPairProvider::new().generate().and_then(|pair| {
        Ok((
            KeyPairProvider::export_public(&pair.public_key)?,
            KeyPairProvider::export_private(&pair.private_key)?,
        ))
    });

    match exported {
        Ok((public, private)) => unsafe {
            // 两个缓冲区都放得下才写入，避免只输出半个密钥对
            let public_required = public.len() + 1;
            let private_required = private.len() + 1;
            if (*public_len as usize) < public_required
                || (*private_len as usize) < private_required
            {
                *public_len = public_required as c_ulong;
                *private_len = private_required as c_ulong;
                return SMAIL_ERR_BUFFER_TOO_SMALL;
            }

            let code = write_str(&public, out_public, public_len);
            if code != SMAIL_OK {
                return code;
            }
            write_str(&private, out_private, private_len)
        },
        Err(e) => error_code(&e),
    }
}

/// 公钥单次可加密的最大字节数
#[no_mangle]
pub extern "C" fn smail_max_payload(public_key: *const c_char, out_max: *mut c_ulong) -> c_int {
    if public_key.is_null() || out_max.is_null() {
        return SMAIL_ERR_NULL_PTR;
    }

    let encoded = match unsafe { read_str(public_key) } {
        Ok(s) => s,
        Err(code) => return code,
    };

    match KeyPairProvider::import_public(encoded) {
        Ok(key) => {
            unsafe {
                *out_max = MessageCipher::max_payload(&key) as c_ulong;
            }
            SMAIL_OK
        }
        Err(e) => error_code(&e),
    }
}

/// 公钥指纹（SPKI 的 SHA-256 十六进制）
#[no_mangle]
pub extern "C" fn smail_fingerprint(
    public_key: *const c_char,
    out_str: *mut c_char,
    out_len: *mut c_ulong,
) -> c_int {
    if public_key.is_null() || out_str.is_null() || out_len.is_null() {
        return SMAIL_ERR_NULL_PTR;
    }

    let encoded = match unsafe { read_str(public_key) } {
        Ok(s) => s,
        Err(code) => return code,
    };

    match KeyPairProvider::import_public(encoded).and_then(|key| fingerprint(&key)) {
        Ok(hex) => unsafe { write_str(&hex, out_str, out_len) },
        Err(e) => error_code(&e),
    }
}

/// RSA-OAEP 加密 UTF-8 文本，输出 Base64 密文
#[no_mangle]
pub extern "C" fn smail_encrypt(
    public_key: *const c_char,
    plaintext: *const c_char,
    out_str: *mut c_char,
    out_len: *mut c_ulong,
) -> c_int {
    if public_key.is_null() || plaintext.is_null() || out_str.is_null() || out_len.is_null() {
        return SMAIL_ERR_NULL_PTR;
    }

    let (encoded, text) = match unsafe { (read_str(public_key), read_str(plaintext)) } {
        (Ok(k), Ok(t)) => (k, t),
        (Err(code), _) | (_, Err(code)) => return code,
    };

    let ciphertext = KeyPairProvider::import_public(encoded)
        .and_then(|key| MessageCipher::encrypt_to_base64(&key, text));

    match ciphertext {
        Ok(ct) => unsafe { write_str(&ct, out_str, out_len) },
        Err(e) => error_code(&e),
    }
}

/// RSA-OAEP 解密 Base64 密文
///
/// 密文无法解密时写入占位文本并返回 `SMAIL_UNDECRYPTABLE`
#[no_mangle]
pub extern "C" fn smail_decrypt(
    private_key: *const c_char,
    ciphertext: *const c_char,
    out_str: *mut c_char,
    out_len: *mut c_ulong,
) -> c_int {
    if private_key.is_null() || ciphertext.is_null() || out_str.is_null() || out_len.is_null() {
        return SMAIL_ERR_NULL_PTR;
    }

    let (encoded, ct) = match unsafe { (read_str(private_key), read_str(ciphertext)) } {
        (Ok(k), Ok(c)) => (k, c),
        (Err(code), _) | (_, Err(code)) => return code,
    };

    let key = match KeyPairProvider::import_private(encoded) {
        Ok(key) => key,
        Err(e) => return error_code(&e),
    };

    let decrypted = MessageCipher::decrypt_from_base64(&key, ct);
    let code = unsafe { write_str(decrypted.as_str(), out_str, out_len) };
    match decrypted {
        Decrypted::Plaintext(_) => code,
        Decrypted::Undecryptable if code == SMAIL_OK => SMAIL_UNDECRYPTABLE,
        Decrypted::Undecryptable => code,
    }
}

/// Base64 编码
#[no_mangle]
pub extern "C" fn smail_base64_encode(
    data: *const c_uchar,
    data_len: c_ulong,
    out_str: *mut c_char,
    out_len: *mut c_ulong,
) -> c_int {
    if data.is_null() || out_str.is_null() || out_len.is_null() {
        return SMAIL_ERR_NULL_PTR;
    }

    let data_slice = unsafe { slice::from_raw_parts(data, data_len as usize) };
    let encoded = base64_encode(data_slice);
    unsafe { write_str(&encoded, out_str, out_len) }
}

/// Base64 解码
#[no_mangle]
pub extern "C" fn smail_base64_decode(
    str: *const c_char,
    out_data: *mut c_uchar,
    out_len: *mut c_ulong,
) -> c_int {
    if str.is_null() || out_data.is_null() || out_len.is_null() {
        return SMAIL_ERR_NULL_PTR;
    }

    let str_slice = match unsafe { read_str(str) } {
        Ok(s) => s,
        Err(code) => return code,
    };

    match base64_decode(str_slice) {
        Ok(data) => unsafe { write_bytes(&data, out_data, out_len) },
        Err(e) => error_code(&e),
    }
}
