//! 注入脚本片段 - 业务能力层
//!
//! 每个函数返回一个异步函数体，由 `ScriptBridge::call` 包装编号和回传。
//! 这里是唯一依赖 NotebookLM 页面结构的地方，页面改版时只需修改选择器。

use serde_json::Value as JsonValue;

/// 回复块选择器
pub const ANSWER_SELECTOR: &str = ".to-user-container .message-text-content";
/// 输入框选择器
pub const INPUT_SELECTOR: &str = "textarea.query-box-input, textarea[aria-label*=\"查询框\"], textarea[aria-label*=\"Chat box\"], textarea[aria-label*=\"Ask\"]";
/// 发送按钮选择器（按优先级）
pub const SUBMIT_SELECTORS: [&str; 3] = [
    "button.submit-button",
    "button[aria-label=\"提交\"]:not(.actions-enter-button)",
    "button[aria-label=\"Send\"]:not(.actions-enter-button)",
];
/// "对话选项"按钮选择器
pub const OPTIONS_SELECTOR: &str = "button[aria-label=\"对话选项\"], button[aria-label=\"Conversation options\"]";
/// 菜单项选择器
pub const MENU_ITEM_SELECTOR: &str = ".mat-mdc-menu-content button, [role=\"menuitem\"]";
/// 删除对话菜单项的文本（多语言）
pub const DELETE_LABELS: [&str; 3] = ["删除对话记录", "Delete conversation", "Delete chat"];
/// 确认对话框按钮的文本（多语言）
pub const CONFIRM_LABELS: [&str; 4] = ["删除", "Delete", "确认", "Confirm"];

pub const OP_CLEAR_STEP: &str = "clear_history_step";
pub const OP_COUNT_ANSWERS: &str = "count_answers";
pub const OP_FILL_INPUT: &str = "fill_input";
pub const OP_CLICK_SUBMIT: &str = "click_submit";
pub const OP_SNAPSHOT: &str = "snapshot";

fn js_str(value: &str) -> String {
    JsonValue::from(value).to_string()
}

fn js_str_array(values: &[&str]) -> String {
    JsonValue::from(values.to_vec()).to_string()
}

/// 清除历史的一轮：有回复块时打开选项菜单、点删除、确认
///
/// 回传 `{ answers, action }`，action ∈ none / deleted / no_options / no_delete_item
pub fn clear_history_step() -> String {
    format!(
        r#"
            const answers = document.querySelectorAll({answer}).length;
            if (answers === 0) {{
                return {{ answers, action: 'none' }};
            }}
            const optionsBtn = document.querySelector({options});
            if (!optionsBtn) {{
                log('options button not found');
                return {{ answers, action: 'no_options' }};
            }}
            optionsBtn.click();
            await sleep(800);

            const labels = {delete_labels};
            const menuItems = Array.from(document.querySelectorAll({menu}));
            const deleteItem = menuItems.find(el => labels.some(l => (el.textContent || '').includes(l)));
            if (!deleteItem) {{
                log('delete item not found among ' + menuItems.length + ' menu items');
                document.body.dispatchEvent(new KeyboardEvent('keydown', {{ key: 'Escape', bubbles: true }}));
                return {{ answers, action: 'no_delete_item' }};
            }}
            deleteItem.click();
            await sleep(800);

            const confirmLabels = {confirm_labels};
            const dialogButtons = Array.from(document.querySelectorAll('mat-dialog-actions button, [role="dialog"] button'));
            const confirmBtn = dialogButtons.reverse().find(el => confirmLabels.some(l => (el.textContent || '').includes(l)));
            if (confirmBtn) {{
                confirmBtn.click();
            }} else {{
                log('confirm button not found, assuming no confirmation needed');
            }}
            return {{ answers, action: 'deleted' }};
        "#,
        answer = js_str(ANSWER_SELECTOR),
        options = js_str(OPTIONS_SELECTOR),
        delete_labels = js_str_array(&DELETE_LABELS),
        menu = js_str(MENU_ITEM_SELECTOR),
        confirm_labels = js_str_array(&CONFIRM_LABELS),
    )
}

/// 统计当前回复块数量，回传 `{ answers }`
pub fn count_answers() -> String {
    format!(
        r#"
            return {{ answers: document.querySelectorAll({answer}).length }};
        "#,
        answer = js_str(ANSWER_SELECTOR),
    )
}

/// 填写输入框并触发 input/change 事件，回传 `{ found }`
pub fn fill_input(prompt: &str) -> String {
    format!(
        r#"
            const input = document.querySelector({input});
            if (!input) {{
                return {{ found: false }};
            }}
            const valueToSet = {prompt};
            input.focus();
            input.click();
            input.value = '';
            const selection = window.getSelection();
            const range = document.createRange();
            range.selectNodeContents(input);
            selection.removeAllRanges();
            selection.addRange(range);
            if (!document.execCommand('insertText', false, valueToSet)) {{
                input.value = valueToSet;
            }}
            input.dispatchEvent(new Event('input', {{ bubbles: true }}));
            input.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ found: true }};
        "#,
        input = js_str(INPUT_SELECTOR),
        prompt = js_str(prompt),
    )
}

/// 点击发送按钮，回传 `{ clicked }`
pub fn click_submit() -> String {
    format!(
        r#"
            const selectors = {selectors};
            let sendBtn = null;
            for (const s of selectors) {{
                sendBtn = document.querySelector(s);
                if (sendBtn) break;
            }}
            if (!sendBtn) {{
                return {{ clicked: false }};
            }}
            sendBtn.disabled = false;
            const opts = {{ bubbles: true, cancelable: true, view: window }};
            sendBtn.dispatchEvent(new MouseEvent('mousedown', opts));
            sendBtn.dispatchEvent(new MouseEvent('mouseup', opts));
            sendBtn.click();
            return {{ clicked: true }};
        "#,
        selectors = js_str_array(&SUBMIT_SELECTORS),
    )
}

/// 读取第 `min_index` 个之后最新的回复块文本和输入框状态
///
/// 回传 `{ count, text, idle }`；没有新回复块时 text 为空字符串。
pub fn snapshot(min_index: usize) -> String {
    format!(
        r#"
            const blocks = document.querySelectorAll({answer});
            let text = '';
            if (blocks.length > {min_index}) {{
                const last = blocks[blocks.length - 1];
                text = (last.innerText || last.textContent || '').trim();
            }}
            const input = document.querySelector({input});
            const idle = !!input && !input.disabled && !input.readOnly;
            return {{ count: blocks.length, text, idle }};
        "#,
        answer = js_str(ANSWER_SELECTOR),
        input = js_str(INPUT_SELECTOR),
        min_index = min_index,
    )
}
